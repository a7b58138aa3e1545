use ndarray::{ArrayView3, Axis};
use thiserror::Error;

/// A single camera image: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the analysis path
/// treats pixel data as opaque apart from rotation.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Returns a copy of this frame rotated clockwise by `rotation`.
    ///
    /// Quarter turns swap width and height.
    pub fn rotated(&self, rotation: Rotation) -> Frame {
        let mut view = self.as_ndarray();
        let (width, height) = match rotation {
            Rotation::Deg0 => return self.clone(),
            Rotation::Deg90 => {
                view = view.permuted_axes([1, 0, 2]);
                view.invert_axis(Axis(1));
                (self.height, self.width)
            }
            Rotation::Deg180 => {
                view.invert_axis(Axis(0));
                view.invert_axis(Axis(1));
                (self.width, self.height)
            }
            Rotation::Deg270 => {
                view = view.permuted_axes([1, 0, 2]);
                view.invert_axis(Axis(0));
                (self.height, self.width)
            }
        };
        let data: Vec<u8> = view.iter().copied().collect();
        Frame::new(data, width, height, self.channels, self.index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unsupported rotation of {0} degrees (expected 0, 90, 180 or 270)")]
pub struct RotationError(pub u32);

/// Sensor rotation reported alongside a frame, in clockwise right angles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether the rotation swaps width and height.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Dimensions of a `(width, height)` image after applying this rotation.
    pub fn apply_to_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_quarter_turn() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = RotationError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees % 360 {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(RotationError(degrees)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// 3x2 single-channel frame:
    /// ```text
    /// 1 2 3
    /// 4 5 6
    /// ```
    fn numbered() -> Frame {
        Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, 1, 7)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10];
        Frame::new(data, 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, R
        let frame = Frame::new(data, 2, 2, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_rotate_0_is_identity() {
        assert_eq!(numbered().rotated(Rotation::Deg0), numbered());
    }

    #[test]
    fn test_rotate_90_clockwise() {
        // 4 1
        // 5 2
        // 6 3
        let rotated = numbered().rotated(Rotation::Deg90);
        assert_eq!((rotated.width(), rotated.height()), (2, 3));
        assert_eq!(rotated.data(), &[4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_rotate_180() {
        let rotated = numbered().rotated(Rotation::Deg180);
        assert_eq!((rotated.width(), rotated.height()), (3, 2));
        assert_eq!(rotated.data(), &[6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_rotate_270_clockwise() {
        // 3 6
        // 2 5
        // 1 4
        let rotated = numbered().rotated(Rotation::Deg270);
        assert_eq!((rotated.width(), rotated.height()), (2, 3));
        assert_eq!(rotated.data(), &[3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn test_rotate_keeps_channels_together() {
        // 2x1 RGB: red, blue
        let frame = Frame::new(vec![255, 0, 0, 0, 0, 255], 2, 1, 3, 0);
        let rotated = frame.rotated(Rotation::Deg90);
        assert_eq!((rotated.width(), rotated.height()), (1, 2));
        assert_eq!(rotated.data(), &[255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn test_rotate_preserves_index() {
        assert_eq!(numbered().rotated(Rotation::Deg270).index(), 7);
    }

    #[rstest]
    #[case(0, Rotation::Deg0)]
    #[case(90, Rotation::Deg90)]
    #[case(180, Rotation::Deg180)]
    #[case(270, Rotation::Deg270)]
    #[case(450, Rotation::Deg90)]
    fn test_rotation_from_degrees(#[case] degrees: u32, #[case] expected: Rotation) {
        assert_eq!(Rotation::try_from(degrees), Ok(expected));
    }

    #[rstest]
    #[case(45)]
    #[case(100)]
    #[case(359)]
    fn test_rotation_rejects_non_right_angles(#[case] degrees: u32) {
        assert_eq!(Rotation::try_from(degrees), Err(RotationError(degrees)));
    }

    #[test]
    fn test_apply_to_dimensions() {
        assert_eq!(Rotation::Deg90.apply_to_dimensions(640, 480), (480, 640));
        assert_eq!(Rotation::Deg180.apply_to_dimensions(640, 480), (640, 480));
    }
}
