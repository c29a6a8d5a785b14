//! Element types and their stream tags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DType {
    F32 = 0,
    F16 = 1,
    BF16 = 2,
    I32 = 3,
}

impl DType {
    /// Every dtype, ordered by tag.
    pub const ALL: [DType; 4] = [DType::F32, DType::F16, DType::BF16, DType::I32];

    /// Width of one element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::I32 => 4,
        }
    }

    /// Tag stored in parameter streams; never renumber a variant.
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        DType::ALL.get(tag as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::DType;

    #[test]
    fn tags_follow_declaration_order() {
        for (index, dtype) in DType::ALL.into_iter().enumerate() {
            assert_eq!(dtype.tag() as usize, index);
            assert_eq!(DType::from_tag(dtype.tag()), Some(dtype));
        }
        assert_eq!(DType::from_tag(4), None);
        assert_eq!(DType::from_tag(u32::MAX), None);
    }

    #[test]
    fn half_types_are_two_bytes() {
        assert_eq!(DType::F16.size_in_bytes(), DType::BF16.size_in_bytes());
        assert_eq!(DType::F16.size_in_bytes() * 2, DType::F32.size_in_bytes());
    }
}
