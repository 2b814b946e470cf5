pub mod opencv_reader;
pub mod opencv_writer;
pub mod processor;

use anyhow::Result;
use opencv::core::{Mat, Size};

pub trait VideoReader: Send {
    /// Frame count reported by the container; may be an estimate.
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    fn frame_size(&self) -> Result<Size>;
    /// Returns `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

/// Iterator over the remaining frames of a reader.
///
/// A read error mid-stream ends the iteration with a warning, the same way
/// a truncated file would.
pub struct Frames<'a> {
    reader: &'a mut dyn VideoReader,
    read: usize,
    done: bool,
}

impl<'a> Frames<'a> {
    pub fn new(reader: &'a mut dyn VideoReader) -> Self {
        Self {
            reader,
            read: 0,
            done: false,
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Mat;

    fn next(&mut self) -> Option<Mat> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(Some(frame)) => {
                self.read += 1;
                Some(frame)
            }
            Ok(None) => {
                tracing::debug!("Frame source exhausted after {} frames", self.read);
                self.done = true;
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Frame source failed after {} frames, treating as end of stream: {:#}",
                    self.read,
                    e
                );
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedReader {
        script: Vec<Result<Option<Mat>>>,
    }

    impl VideoReader for ScriptedReader {
        fn frame_count(&self) -> Result<usize> {
            Ok(self.script.len())
        }

        fn source_fps(&self) -> Result<f64> {
            Ok(30.0)
        }

        fn frame_size(&self) -> Result<Size> {
            Ok(Size::new(640, 480))
        }

        fn next_frame(&mut self) -> Result<Option<Mat>> {
            if self.script.is_empty() {
                return Ok(None);
            }
            self.script.remove(0)
        }
    }

    #[test]
    fn test_frames_stop_at_end_of_stream() {
        let mut reader = ScriptedReader {
            script: vec![Ok(Some(Mat::default())), Ok(Some(Mat::default())), Ok(None)],
        };
        assert_eq!(Frames::new(&mut reader).count(), 2);
    }

    #[test]
    fn test_frames_stop_on_read_error() {
        let mut reader = ScriptedReader {
            script: vec![
                Ok(Some(Mat::default())),
                Err(anyhow::anyhow!("corrupt packet")),
                Ok(Some(Mat::default())),
            ],
        };
        let mut frames = Frames::new(&mut reader);
        assert!(frames.next().is_some());
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());
    }
}
