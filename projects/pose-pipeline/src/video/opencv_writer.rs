use crate::pipeline::FrameSink;
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::VideoWriter,
};

/// Encodes frames to a video file with the `mp4v` codec.
pub struct VideoSink {
    writer: VideoWriter,
    path: String,
    frames: usize,
}

impl VideoSink {
    pub fn new(path: &str, fps: f64, size: Size) -> Result<Self> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path, fourcc, fps, size, true)
            .with_context(|| format!("Failed to create video writer for {}", path))?;
        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open output video: {}", path));
        }

        tracing::info!(
            "VideoSink: writing {} at {}x{}, fps={:.2}",
            path,
            size.width,
            size.height,
            fps
        );

        Ok(Self {
            writer,
            path: path.to_string(),
            frames: 0,
        })
    }
}

impl FrameSink<Mat> for VideoSink {
    fn write(&mut self, frame: Mat) -> Result<()> {
        self.writer
            .write(&frame)
            .with_context(|| format!("Failed to encode frame {} to {}", self.frames, self.path))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        tracing::info!("VideoSink: closed {} after {} frames", self.path, self.frames);
        Ok(())
    }
}
