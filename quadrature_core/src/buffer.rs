//! Interleaved stereo double buffer.
//!
//! Layout for `N` frames per half (`2N` scalars per half):
//!
//! ```text
//! position:  0    1    2    3   ...  2N-1 | 2N  ...  4N-1
//! channel:   L    R    L    R   ...   R   |  L  ...   R
//! half:      <-------- First ---------->  | <-- Second -->
//! ```

/// Stereo: left and right samples alternate.
pub const STEREO: usize = 2;

/// One of the two halves of a [`DoubleBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Half {
    First,
    Second,
}

impl Half {
    /// The half the consumer is reading while this one is written.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Half::First => Half::Second,
            Half::Second => Half::First,
        }
    }

    /// Absolute position of the half's first scalar.
    #[inline]
    pub fn offset(self, half_len: usize) -> usize {
        match self {
            Half::First => 0,
            Half::Second => half_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleBuffer {
    samples: Box<[i16]>,
    half_frames: usize,
}

impl DoubleBuffer {
    /// Zeroed buffer of `half_frames` stereo frames per half.
    pub fn new(half_frames: usize) -> Self {
        Self {
            samples: vec![0; 2 * STEREO * half_frames].into_boxed_slice(),
            half_frames,
        }
    }

    #[inline]
    pub fn half_frames(&self) -> usize {
        self.half_frames
    }

    /// Scalars per half.
    #[inline]
    pub fn half_len(&self) -> usize {
        STEREO * self.half_frames
    }

    /// Scalars in the whole buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn sample(&self, position: usize) -> i16 {
        self.samples[position]
    }

    pub fn half(&self, half: Half) -> &[i16] {
        let start = half.offset(self.half_len());
        &self.samples[start..start + self.half_len()]
    }

    pub fn half_mut(&mut self, half: Half) -> &mut [i16] {
        let len = self.half_len();
        let start = half.offset(len);
        &mut self.samples[start..start + len]
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }
}
