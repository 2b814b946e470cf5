use crate::pipeline::FrameTransform;
use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc::{circle, line, rectangle, FILLED, LINE_8};
use opencv::prelude::*;
use usls::models::YOLO;
use usls::{Config, Image};

/// Keypoints below this confidence are not drawn
const MIN_KEYPOINT_CONF: f32 = 0.5;

/// COCO-17 skeleton as pairs of keypoint indices
const SKELETON: [(usize, usize); 16] = [
    (15, 13),
    (13, 11),
    (16, 14),
    (14, 12),
    (11, 12),
    (5, 11),
    (6, 12),
    (5, 6),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
];

/// A pose-estimation model that draws its detections onto a copy of each frame.
pub struct PoseAnnotator {
    model: YOLO,
}

impl PoseAnnotator {
    pub fn new(model_path: &str) -> Result<Self> {
        let config = Config::yolo_pose()
            .with_model_file(model_path)
            .with_version(8.into());

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = YOLO::new(config)?;
        Ok(Self { model })
    }

    /// Run the model on one frame and return an annotated copy.
    pub fn annotate(&mut self, frame: &Mat) -> Result<Mat> {
        let input = Image::from(mat_to_dynamic_image(frame)?);
        let results = self.model.forward(std::slice::from_ref(&input))?;

        let mut canvas = frame.try_clone()?;
        let Some(y) = results.into_iter().next() else {
            return Ok(canvas);
        };

        for hbb in &y.hbbs {
            let rect = Rect::new(
                hbb.xmin() as i32,
                hbb.ymin() as i32,
                hbb.width() as i32,
                hbb.height() as i32,
            );
            rectangle(&mut canvas, rect, Scalar::new(255.0, 128.0, 0.0, 0.0), 2, LINE_8, 0)?;
        }

        for keypoints in &y.keypointss {
            let visible: Vec<Option<Point>> = keypoints
                .iter()
                .map(|kp| {
                    (kp.confidence().unwrap_or(0.0) >= MIN_KEYPOINT_CONF)
                        .then(|| Point::new(kp.x() as i32, kp.y() as i32))
                })
                .collect();

            for &(a, b) in SKELETON.iter() {
                if let (Some(Some(pa)), Some(Some(pb))) = (visible.get(a), visible.get(b)) {
                    line(&mut canvas, *pa, *pb, Scalar::new(0.0, 255.0, 255.0, 0.0), 2, LINE_8, 0)?;
                }
            }

            for point in visible.iter().flatten() {
                circle(&mut canvas, *point, 4, Scalar::new(0.0, 0.0, 255.0, 0.0), FILLED, LINE_8, 0)?;
            }
        }

        Ok(canvas)
    }
}

impl FrameTransform<Mat, Mat> for PoseAnnotator {
    fn apply(&mut self, frame: Mat) -> Result<Mat> {
        self.annotate(&frame)
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    let img_buffer =
        ImageBuffer::<Rgb<u8>, _>::from_vec(size.width as u32, size.height as u32, buffer)
            .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}
