//! Debug views of the intermediate attachments.

/// What the lighting pass outputs instead of the composited volume.
///
/// Press F3 to cycle through modes in the sample.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// Composited volume.
    #[default]
    None = 0,
    /// Exit positions from the back-face pass as RGB.
    ExitPositions = 1,
    /// Entry positions reconstructed from exit and direction.
    EntryPositions = 2,
    /// Normalized ray direction remapped to 0..1.
    Directions = 3,
    /// Segment length relative to the cube diagonal.
    RayLength = 4,
    /// Front-face depth, amplified.
    Depth = 5,
}

impl DebugMode {
    /// Cycle to the next debug mode.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::ExitPositions,
            Self::ExitPositions => Self::EntryPositions,
            Self::EntryPositions => Self::Directions,
            Self::Directions => Self::RayLength,
            Self::RayLength => Self::Depth,
            Self::Depth => Self::None,
        }
    }

    /// Get the mode as a u32 for shader push constants.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_returns_to_none() {
        let mut mode = DebugMode::None;
        let mut seen = Vec::new();
        for _ in 0..6 {
            mode = mode.next();
            seen.push(mode.as_u32());
        }
        assert_eq!(mode, DebugMode::None);
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 0]);
    }
}
