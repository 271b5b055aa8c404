use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::refocus::{
    common::error::{RefocusError, Result},
    config::RefocusConfig,
    core::PassStats,
    io::{AutoReader, ChannelImage, RasterReader, RasterWriter, StandardWriter},
    pipeline::{PipelineTimings, Refocuser, Timer},
};

/// Result of running the relaxation over a decoded image.
#[derive(Debug)]
pub struct RefocusOutcome {
    pub image: ChannelImage,
    pub iterations: usize,
    /// Summed statistics of every pass
    pub stats: PassStats,
    /// The final iteration was already handed to the intermediate sink
    pub final_saved: bool,
    pub timings: PipelineTimings,
}

/// Path of the intermediate result after `iteration`: the file name of
/// `path` prefixed with the zero-padded iteration number.
pub fn intermediate_path(path: &Path, iteration: usize) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RefocusError::OutputWriteError(format!("{}: not a file path", path.display())))?;
    Ok(path.with_file_name(format!("{iteration:04}{name}")))
}

pub struct RefocusPipeline<R: RasterReader, W: RasterWriter> {
    reader: R,
    writer: W,
    config: RefocusConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl RefocusPipeline<AutoReader, StandardWriter> {
    pub fn new(config: RefocusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader: AutoReader,
            writer: StandardWriter,
            config,
            cancel: None,
        })
    }
}

impl<R: RasterReader, W: RasterWriter> RefocusPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, config: RefocusConfig) -> Self {
        Self {
            reader,
            writer,
            config,
            cancel: None,
        }
    }

    /// Flag polled between passes; setting it aborts the run with `Cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Runs every configured iteration without intermediate saves.
    pub fn process(&self, image: ChannelImage) -> Result<RefocusOutcome> {
        self.process_with(image, |_, _| Ok(()))
    }

    /// Runs every configured iteration, handing every `save_every`-th estimate to `save`.
    #[instrument(skip(self, image, save), fields(width = image.width, height = image.height))]
    pub fn process_with<F>(&self, image: ChannelImage, mut save: F) -> Result<RefocusOutcome>
    where
        F: FnMut(usize, &ChannelImage) -> Result<()>,
    {
        let mut timings = PipelineTimings::new();

        let timer = Timer::start("prepare");
        let mut refocuser = {
            let _span = tracing::info_span!("prepare").entered();
            Refocuser::new(&self.config, image)?
        };
        timings.record(timer);

        let iterations = self.config.iterations;
        let save_every = self.config.save_every;
        let mut stats = PassStats::default();
        let mut final_saved = false;

        let timer = Timer::start("relax");
        {
            let _span = tracing::info_span!("relax", iterations).entered();
            for i in 1..=iterations {
                if self.is_cancelled() {
                    warn!(iteration = i - 1, "Refocus cancelled");
                    return Err(RefocusError::Cancelled(i - 1));
                }
                stats += refocuser.step()?;
                if save_every > 0 && i % save_every == 0 {
                    save(i, &refocuser.snapshot()?)?;
                    final_saved = i == iterations;
                }
            }
        }
        timings.record(timer);

        info!(
            iterations,
            energy_delta = stats.energy_delta,
            updated = stats.updated_pixels,
            "Relaxation complete"
        );

        Ok(RefocusOutcome {
            image: refocuser.finish()?,
            iterations,
            stats,
            final_saved,
            timings,
        })
    }

    fn decode(&self, input_data: &[u8], timings: &mut PipelineTimings) -> Result<ChannelImage> {
        let timer = Timer::start("decode");
        let image = {
            let _span = tracing::info_span!("decode").entered();
            self.reader.read_image(input_data)?
        };
        timings.record(timer);
        Ok(image)
    }

    fn encode(&self, image: &ChannelImage, output: &mut dyn Write, timings: &mut PipelineTimings) -> Result<()> {
        let timer = Timer::start("encode");
        {
            let _span = tracing::info_span!("encode").entered();
            self.writer.write_image(image, output, &self.config)?;
        }
        timings.record(timer);
        Ok(())
    }

    /// Decodes `input_data`, restores it and writes the result to `output`.
    ///
    /// Intermediate results go to the same stream, one encoded image each.
    #[instrument(skip(self, input_data, output), fields(input_size = input_data.len()))]
    pub fn convert(&self, input_data: &[u8], output: &mut dyn Write) -> Result<PipelineTimings> {
        info!("Starting refocus");
        let mut timings = PipelineTimings::new();
        let image = self.decode(input_data, &mut timings)?;

        let outcome = self.process_with(image, |_, snapshot| {
            self.writer.write_image(snapshot, &mut *output, &self.config)
        })?;
        timings.merge(outcome.timings);

        if !outcome.final_saved {
            self.encode(&outcome.image, output, &mut timings)?;
        }

        info!(width = outcome.image.width, height = outcome.image.height, "Refocus complete");
        timings.log_summary();
        Ok(timings)
    }

    /// Restores `input_data` into `output_path`; intermediates land next to it
    /// as `NNNN<name>`.
    #[instrument(skip(self, input_data, output_path))]
    pub fn convert_to_path<Q: AsRef<Path>>(&self, input_data: &[u8], output_path: Q) -> Result<PipelineTimings> {
        let output_path = output_path.as_ref();
        let mut timings = PipelineTimings::new();
        let image = self.decode(input_data, &mut timings)?;

        let outcome = self.process_with(image, |iteration, snapshot| {
            let path = intermediate_path(output_path, iteration)?;
            info!(path = %path.display(), "Saving intermediate result");
            let mut file = create_output(&path)?;
            self.writer.write_image(snapshot, &mut file, &self.config)
        })?;
        timings.merge(outcome.timings);

        let mut output_file = {
            let _span = tracing::info_span!("create_output_file").entered();
            create_output(output_path)?
        };
        self.encode(&outcome.image, &mut output_file, &mut timings)?;

        info!(
            output = %output_path.display(),
            width = outcome.image.width,
            height = outcome.image.height,
            "Refocus complete"
        );
        timings.log_summary();
        Ok(timings)
    }

    #[instrument(skip(self, input_path, output_path))]
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
    ) -> Result<PipelineTimings> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Converting file"
        );

        let input_data = {
            let _span = tracing::info_span!("read_input_file").entered();
            std::fs::read(input_path).map_err(|e| {
                RefocusError::InputReadError(format!("{}: {}", input_path.display(), e))
            })?
        };

        self.convert_to_path(&input_data, output_path)
    }

    pub fn config(&self) -> &RefocusConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RefocusConfig) {
        self.config = config;
    }
}

fn create_output(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path)
        .map_err(|e| RefocusError::OutputWriteError(format!("{}: {}", path.display(), e)))
}
