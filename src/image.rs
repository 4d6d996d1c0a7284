// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! Typed access to slave windows inside the process image.
//!
//! Values are stored little-endian and assembled one byte at a time, so no
//! access depends on the alignment of the image.

use crate::types::{Direction, Error, Result, Window};

/// A fixed-width value that can live in the process image.
pub trait PdoValue: Copy {
    /// Width in bytes.
    const WIDTH: usize;

    /// Decode from the first `WIDTH` bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// If `bytes` is shorter than `WIDTH`. Use [`read`] for checked access
    /// to a window.
    fn decode(bytes: &[u8]) -> Self;

    /// Encode into the first `WIDTH` bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// If `bytes` is shorter than `WIDTH`. Use [`write`] for checked access
    /// to a window.
    fn encode(self, bytes: &mut [u8]);
}

macro_rules! pdo_int {
    ($($t:ty => $u:ty),*) => {$(
        impl PdoValue for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn decode(bytes: &[u8]) -> Self {
                let mut raw: $u = 0;
                for (i, b) in bytes[..Self::WIDTH].iter().enumerate() {
                    raw |= (*b as $u) << (8 * i);
                }
                raw as $t
            }

            fn encode(self, bytes: &mut [u8]) {
                let raw = self as $u;
                for (i, b) in bytes[..Self::WIDTH].iter_mut().enumerate() {
                    *b = (raw >> (8 * i)) as u8;
                }
            }
        }
    )*};
}

pdo_int!(u8 => u8, i8 => u8, u16 => u16, i16 => u16, u32 => u32,
         i32 => u32, u64 => u64, i64 => u64);

impl PdoValue for f32 {
    const WIDTH: usize = 4;

    fn decode(bytes: &[u8]) -> Self {
        f32::from_bits(u32::decode(bytes))
    }

    fn encode(self, bytes: &mut [u8]) {
        self.to_bits().encode(bytes)
    }
}

impl PdoValue for f64 {
    const WIDTH: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        f64::from_bits(u64::decode(bytes))
    }

    fn encode(self, bytes: &mut [u8]) {
        self.to_bits().encode(bytes)
    }
}

/// Byte offset addressed by a module index for values of type `T`, following
/// the legacy accessor convention: 32-bit values are addressed in units of
/// their width, narrower values by plain byte offset.
pub const fn module_offset<T: PdoValue>(module_index: u8) -> usize {
    if T::WIDTH == 4 {
        module_index as usize * 4
    } else {
        module_index as usize
    }
}

/// A window resolved against the image, with enough context for errors.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub slave: u16,
    pub direction: Direction,
    pub window: Window,
}

impl Target {
    /// Absolute image range for a `width` byte access at `offset`.
    fn range(&self, offset: usize, width: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(width) {
            Some(end) if end <= self.window.len => {
                Ok(self.window.offset + offset..self.window.offset + end)
            }
            _ => Err(Error::OutOfRange {
                slave: self.slave,
                direction: self.direction,
                offset,
                width,
                len: self.window.len,
            }),
        }
    }

    /// The whole window as a slice of `image`.
    pub fn slice<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.window.offset..self.window.end()]
    }

    /// The whole window as a mutable slice of `image`.
    pub fn slice_mut<'a>(&self, image: &'a mut [u8]) -> &'a mut [u8] {
        &mut image[self.window.offset..self.window.end()]
    }
}

/// Read a `T` at `offset` bytes into the target window.
pub fn read<T: PdoValue>(image: &[u8], target: &Target, offset: usize) -> Result<T> {
    let range = target.range(offset, T::WIDTH)?;
    Ok(T::decode(&image[range]))
}

/// Write `value` at `offset` bytes into the target window.
pub fn write<T: PdoValue>(image: &mut [u8], target: &Target, offset: usize, value: T) -> Result<()> {
    let range = target.range(offset, T::WIDTH)?;
    value.encode(&mut image[range]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(offset: usize, len: usize) -> Target {
        Target {
            slave: 1,
            direction: Direction::Output,
            window: Window::new(offset, len),
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 4];
        0x0102_0304_i32.encode(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);

        0xBEEF_u16.encode(&mut buf);
        assert_eq!(&buf[..2], &[0xEF, 0xBE]);
        assert_eq!(i16::decode(&[0xFE, 0xFF]), -2);
        assert_eq!(i32::decode(&[0x00, 0x00, 0x00, 0x80]), i32::MIN);
    }

    #[test]
    fn test_round_trip() {
        let mut buf = [0u8; 8];
        for v in [0u8, 1, 0x7F, 0x80, 0xFF] {
            v.encode(&mut buf);
            assert_eq!(u8::decode(&buf), v);
        }
        for v in [0u16, 1, 0x1234, 0xFFFF] {
            v.encode(&mut buf);
            assert_eq!(u16::decode(&buf), v);
        }
        for v in [i16::MIN, -1, 0, 300, i16::MAX] {
            v.encode(&mut buf);
            assert_eq!(i16::decode(&buf), v);
        }
        for v in [i32::MIN, -123_456, 0, 0x0102_0304, i32::MAX] {
            v.encode(&mut buf);
            assert_eq!(i32::decode(&buf), v);
        }
        for v in [i64::MIN, -1, 0x0102_0304_0506_0708] {
            v.encode(&mut buf);
            assert_eq!(i64::decode(&buf), v);
        }
        (-1.5f32).encode(&mut buf);
        assert_eq!(f32::decode(&buf), -1.5);
        core::f64::consts::PI.encode(&mut buf);
        assert_eq!(f64::decode(&buf), core::f64::consts::PI);
    }

    #[test]
    #[should_panic]
    fn test_decode_short_slice() {
        u32::decode(&[1, 2, 3]);
    }

    #[test]
    fn test_checked_access_short_window() {
        let mut image = [0u8; 3];
        let t = target(0, 3);
        assert!(read::<u32>(&image, &t, 0).is_err());
        assert!(write(&mut image, &t, 0, 0u32).is_err());
        assert!(write(&mut image, &t, 0, 0.5f64).is_err());
    }

    #[test]
    fn test_unaligned_access() {
        let mut image = [0u8; 16];
        let t = target(3, 10);
        write(&mut image, &t, 1, 0x1122_3344_u32).unwrap();
        assert_eq!(&image[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(read::<u32>(&image, &t, 1).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_module_offsets() {
        assert_eq!(module_offset::<i32>(1), 4);
        assert_eq!(module_offset::<i32>(3), 12);
        assert_eq!(module_offset::<u8>(1), 1);
        assert_eq!(module_offset::<u16>(1), 1);
        assert_eq!(module_offset::<i16>(5), 5);
    }

    #[test]
    fn test_window_boundary() {
        let mut image = [0xAAu8; 12];
        let t = target(4, 4);

        // last value fitting the window exactly
        write(&mut image, &t, 2, 0x0000_u16).unwrap();
        write(&mut image, &t, 0, 0u32).unwrap();
        assert_eq!(&image[4..8], &[0, 0, 0, 0]);

        match write(&mut image, &t, 3, 0u16) {
            Err(Error::OutOfRange { slave: 1, offset: 3, width: 2, len: 4, .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(read::<u32>(&image, &t, 1).is_err());
        assert!(read::<u8>(&image, &t, usize::MAX).is_err());
        // neighbours are untouched
        assert_eq!(&image[..4], &[0xAA; 4]);
        assert_eq!(&image[8..], &[0xAA; 4]);
    }

    #[test]
    fn test_empty_window() {
        let image = [0u8; 4];
        let t = target(2, 0);
        assert!(read::<u8>(&image, &t, 0).is_err());
        assert!(t.slice(&image).is_empty());
    }
}
