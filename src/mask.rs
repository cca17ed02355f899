//! Model output to person mask
//!
//! Post-processing runs in a fixed order: pick the person class and apply
//! the activation at model resolution, crop and resize back to the frame,
//! then threshold. Thresholding after the resize keeps the bilinear
//! interpolation working on continuous scores.

use crate::config::{ScoreActivation, TensorLayout};
use crate::error::{Result, SegmentationError};
use crate::geometry;
use crate::types::{Dimensions, Padding, PersonMask, ScoreField};
use ndarray::{s, Array4, ArrayView2, Zip};

/// Index of the person class in two-class output
pub const PERSON_CLASS: usize = 1;

/// Where the class channels live in a model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClassLayout {
    channels_last: bool,
    classes: usize,
}

/// Recognize `[1, H, W, C]` or `[1, C, H, W]` with `C` of 1 or 2
///
/// `layout` breaks the tie for tensors such as `[1, 2, 2, 2]`.
fn class_layout(shape: &[usize], layout: TensorLayout) -> Result<ClassLayout> {
    let &[batch, d1, _, d3] = shape else {
        return Err(unexpected_shape(shape));
    };
    if batch != 1 {
        return Err(unexpected_shape(shape));
    }

    let is_class_dim = |d: usize| d == 1 || d == 2;
    let last = ClassLayout {
        channels_last: true,
        classes: d3,
    };
    let first = ClassLayout {
        channels_last: false,
        classes: d1,
    };
    let (preferred, fallback) = match layout {
        TensorLayout::Nhwc => (last, first),
        TensorLayout::Nchw => (first, last),
    };

    if is_class_dim(preferred.classes) {
        Ok(preferred)
    } else if is_class_dim(fallback.classes) {
        Ok(fallback)
    } else {
        Err(unexpected_shape(shape))
    }
}

fn unexpected_shape(shape: &[usize]) -> SegmentationError {
    SegmentationError::inference(format!(
        "unexpected output shape {:?}; expected [1, H, W, 1|2] or [1, 1|2, H, W]",
        shape
    ))
}

fn channel(output: &Array4<f32>, layout: ClassLayout, index: usize) -> ArrayView2<'_, f32> {
    if layout.channels_last {
        output.slice(s![0, .., .., index])
    } else {
        output.slice(s![0, index, .., ..])
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Select the person channel and apply `activation`
///
/// Two-class softmax reduces to `sigmoid(person - background)`. Softmax on a
/// single-channel output is rejected since there is nothing to normalize
/// against.
pub fn person_scores(
    output: &Array4<f32>,
    layout: TensorLayout,
    activation: ScoreActivation,
) -> Result<ScoreField> {
    let classes = class_layout(output.shape(), layout)?;
    let person_index = if classes.classes == 2 { PERSON_CLASS } else { 0 };
    let person = channel(output, classes, person_index);

    let scores = match activation {
        ScoreActivation::None => person.to_owned(),
        ScoreActivation::Sigmoid => person.mapv(sigmoid),
        ScoreActivation::Softmax => {
            if classes.classes != 2 {
                return Err(SegmentationError::inference(format!(
                    "softmax activation needs two classes, output {:?} has one",
                    output.shape()
                )));
            }
            let background = channel(output, classes, 0);
            Zip::from(&person)
                .and(&background)
                .map_collect(|&p, &b| sigmoid(p - b))
        },
    };

    Ok(ScoreField::new(scores))
}

/// Person scores resized back to the original frame
pub fn scores_at_frame_resolution(
    output: &Array4<f32>,
    layout: TensorLayout,
    activation: ScoreActivation,
    original: Dimensions,
    padding: Padding,
) -> Result<ScoreField> {
    let scores = person_scores(output, layout, activation)?;
    Ok(geometry::remove_padding_and_resize_back(
        &scores, original, padding,
    ))
}

/// Classify each score; strictly greater than `threshold` is person
#[must_use]
pub fn threshold_scores(scores: &ScoreField, threshold: f32) -> PersonMask {
    let data = scores
        .view()
        .iter()
        .map(|&score| u8::from(score > threshold))
        .collect();
    PersonMask::from_indicators(data, scores.dimensions())
}
