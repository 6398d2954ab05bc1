use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array3, ArrayView3, Zip};

use super::types::{Result, SubtractorError};

/// Per-pixel background estimate
///
/// The float accumulator is the authoritative state. Small per-frame
/// increments would be lost to rounding in 8 bits, so the 8-bit `display`
/// view is only ever derived from it and never written directly.
/// Both arrays are laid out as (height, width, channel).
pub struct BackgroundModel {
    accumulator: Array3<f32>,
    display: Array3<u8>,
}

/// Round to nearest (ties to even) and clamp into the 8-bit range
fn saturate_u8(value: f32) -> u8 {
    value.round_ties_even().clamp(0.0, 255.0) as u8
}

impl BackgroundModel {
    /// Start the model as an exact copy of the given frame
    pub fn from_frame(frame: ArrayView3<u8>) -> Self {
        let display = frame.to_owned();
        let accumulator = display.mapv(f32::from);
        Self {
            accumulator,
            display,
        }
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width, _) = self.display.dim();
        (width as u32, height as u32)
    }

    pub fn channels(&self) -> u8 {
        self.display.dim().2 as u8
    }

    /// 8-bit view of the model, as used for classification and snapshots
    pub fn display(&self) -> ArrayView3<u8> {
        self.display.view()
    }

    /// Move every sample one `step` towards the matching frame sample
    ///
    /// Samples where the frame is brighter than the model go up, darker go
    /// down, equal ones stay. Comparison is against the 8-bit view. When
    /// `frozen` is given, pixels where it is non-zero keep their value.
    pub fn nudge(&mut self, frame: ArrayView3<u8>, step: f32, frozen: Option<&GrayImage>) {
        Zip::indexed(&mut self.accumulator)
            .and(&self.display)
            .and(&frame)
            .for_each(|(y, x, _), acc, &background, &current| {
                if let Some(mask) = frozen {
                    if mask.get_pixel(x as u32, y as u32)[0] != 0 {
                        return;
                    }
                }

                if current > background {
                    *acc += step;
                } else if current < background {
                    *acc -= step;
                }
            });

        self.refresh_display();
    }

    fn refresh_display(&mut self) {
        Zip::from(&mut self.display)
            .and(&self.accumulator)
            .for_each(|display, &acc| *display = saturate_u8(acc));
    }

    /// Copy the 8-bit view into an image with the frame's channel layout
    pub fn to_image(&self) -> Result<DynamicImage> {
        let (width, height) = self.dimensions();
        let channels = self.channels();
        let raw: Vec<u8> = self.display.iter().copied().collect();

        let image = match channels {
            1 => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
            _ => None,
        };
        image.ok_or(SubtractorError::UnsupportedChannels(channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gray(width: usize, height: usize, values: Vec<u8>) -> Array3<u8> {
        Array3::from_shape_vec((height, width, 1), values).unwrap()
    }

    #[test]
    fn starts_as_copy_of_frame() {
        let frame = gray(2, 1, vec![3, 250]);
        let model = BackgroundModel::from_frame(frame.view());
        assert_eq!(model.display(), frame.view());
        assert_eq!(model.dimensions(), (2, 1));
        assert_eq!(model.channels(), 1);
    }

    #[test]
    fn small_steps_accumulate_before_showing() {
        let mut model = BackgroundModel::from_frame(gray(1, 1, vec![100]).view());
        let brighter = gray(1, 1, vec![200]);

        for _ in 0..4 {
            model.nudge(brighter.view(), 0.1, None);
        }
        assert_eq!(model.display()[[0, 0, 0]], 100);

        for _ in 0..2 {
            model.nudge(brighter.view(), 0.1, None);
        }
        assert_eq!(model.display()[[0, 0, 0]], 101);
    }

    #[test]
    fn nudges_towards_frame_in_both_directions() {
        let mut model = BackgroundModel::from_frame(gray(3, 1, vec![10, 10, 10]).view());
        model.nudge(gray(3, 1, vec![20, 10, 0]).view(), 2.0, None);
        assert_eq!(model.display().iter().copied().collect::<Vec<_>>(), vec![12, 10, 8]);
    }

    #[test]
    fn frozen_pixels_keep_their_value() {
        let mut model = BackgroundModel::from_frame(gray(2, 1, vec![50, 50]).view());
        let mask = GrayImage::from_raw(2, 1, vec![255, 0]).unwrap();
        model.nudge(gray(2, 1, vec![90, 90]).view(), 3.0, Some(&mask));
        assert_eq!(model.display().iter().copied().collect::<Vec<_>>(), vec![50, 53]);
    }

    #[test]
    fn display_saturates_at_range_limits() {
        let mut model = BackgroundModel::from_frame(gray(2, 1, vec![254, 1]).view());
        model.nudge(gray(2, 1, vec![255, 0]).view(), 5.0, None);
        assert_eq!(model.display().iter().copied().collect::<Vec<_>>(), vec![255, 0]);
    }

    #[test]
    fn image_keeps_channel_layout() {
        let model = BackgroundModel::from_frame(gray(2, 2, vec![1, 2, 3, 4]).view());
        let image = model.to_image().unwrap();
        assert_eq!(image.as_luma8().unwrap().get_pixel(1, 1), &Luma([4]));

        let color = Array3::from_shape_vec((1, 1, 3), vec![7u8, 8, 9]).unwrap();
        let model = BackgroundModel::from_frame(color.view());
        let image = model.to_image().unwrap();
        assert_eq!(image.as_rgb8().unwrap().as_raw(), &vec![7, 8, 9]);
    }

    fn rgb(width: usize, height: usize, values: Vec<u8>) -> Array3<u8> {
        Array3::from_shape_vec((height, width, 3), values).unwrap()
    }

    #[test]
    fn color_channels_are_nudged_independently() {
        let mut model = BackgroundModel::from_frame(rgb(1, 1, vec![50, 50, 50]).view());
        model.nudge(rgb(1, 1, vec![90, 10, 50]).view(), 2.0, None);
        assert_eq!(model.display().iter().copied().collect::<Vec<_>>(), vec![52, 48, 50]);
    }

    #[test]
    fn frozen_color_pixel_keeps_all_channels() {
        let mut model = BackgroundModel::from_frame(rgb(2, 1, vec![50; 6]).view());
        let mask = GrayImage::from_raw(2, 1, vec![255, 0]).unwrap();
        model.nudge(
            rgb(2, 1, vec![90, 10, 50, 90, 10, 50]).view(),
            2.0,
            Some(&mask),
        );
        assert_eq!(
            model.display().iter().copied().collect::<Vec<_>>(),
            vec![50, 50, 50, 52, 48, 50]
        );
    }
}
