//! Five-point face alignment onto the embedding template
//!
//! Eye corners, nose tip and mouth corners are mapped with a least-squares
//! similarity transform onto the standard 112x112 template, then the frame
//! is warped into the aligned chip.

use crate::frame::{mesh, FaceLandmarks, VideoFrame};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use ndarray::Array4;
use tracing::warn;

/// Side of the aligned face chip, in pixels
pub const ALIGNED_FACE_SIZE: u32 = 112;

/// Destination anchors on the 112x112 template
const TEMPLATE: [(f32, f32); 5] = [
    (30.2946, 51.6963),
    (65.5318, 51.5014),
    (48.0252, 71.7366),
    (33.5493, 92.3655),
    (62.7299, 92.2041),
];

/// Aligned face chip ready for the embedding model
#[derive(Debug, Clone)]
pub struct AlignedFace {
    pub image: RgbImage,
}

impl AlignedFace {
    /// NCHW tensor with pixels scaled to [-1, 1]
    pub fn to_tensor(&self) -> Array4<f32> {
        let side = ALIGNED_FACE_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in self.image.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - 127.5) / 127.5;
            }
        }
        tensor
    }
}

/// Least-squares similarity transform (rotation, uniform scale,
/// translation) mapping `src` onto `dst`, as a row-major 3x3 matrix.
fn similarity_transform(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<[f32; 9]> {
    if src.len() != dst.len() || src.len() < 2 {
        return None;
    }
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32)]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p.0, ay + p.1));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let mut a = 0.0;
    let mut b = 0.0;
    let mut var = 0.0;
    for (s, d) in src.iter().zip(dst) {
        let (xs, ys) = (s.0 - msx, s.1 - msy);
        let (xd, yd) = (d.0 - mdx, d.1 - mdy);
        a += xs * xd + ys * yd;
        b += xs * yd - ys * xd;
        var += xs * xs + ys * ys;
    }
    if var < 1e-6 {
        return None;
    }

    let c = a / var;
    let s = b / var;
    let tx = mdx - (c * msx - s * msy);
    let ty = mdy - (s * msx + c * msy);
    Some([c, -s, tx, s, c, ty, 0.0, 0.0, 1.0])
}

/// Extract the aligned face chip. `None` if the frame carries no pixels,
/// an anchor landmark is missing, or the transform is degenerate.
pub fn align_face(frame: &VideoFrame, face: &FaceLandmarks) -> Option<AlignedFace> {
    let image = frame.to_rgb_image()?;
    let anchors = face.pixels(mesh::ALIGNMENT, frame.size())?;
    let src: Vec<(f32, f32)> = anchors.iter().map(|p| (p.x, p.y)).collect();

    let matrix = similarity_transform(&src, &TEMPLATE)?;
    let projection = match Projection::from_matrix(matrix) {
        Some(p) => p,
        None => {
            warn!("Alignment transform is not invertible");
            return None;
        }
    };

    let mut chip = RgbImage::new(ALIGNED_FACE_SIZE, ALIGNED_FACE_SIZE);
    warp_into(
        &image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut chip,
    );
    Some(AlignedFace { image: chip })
}
