use serde::{Deserialize, Serialize};

/// Visual content a presentation surface knows how to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StimulusType {
    Blank,
    Fixation {
        size: f32,
        color: [u8; 4],
    },
    Circle {
        radius: f32,
        color: [u8; 4],
    },
    Rectangle {
        width: f32,
        height: f32,
        color: [u8; 4],
    },
    Arrow {
        direction: ArrowDirection,
        size: f32,
        color: [u8; 4],
    },
    /// Five arrows in a row: two flankers, the target, two flankers.
    Flanker {
        target: ArrowDirection,
        flankers: ArrowDirection,
        size: f32,
        color: [u8; 4],
    },
}

impl StimulusType {
    pub const WHITE: [u8; 4] = [255, 255, 255, 255];

    pub fn fixation() -> Self {
        StimulusType::Fixation {
            size: 40.0,
            color: Self::WHITE,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, StimulusType::Blank)
    }

    /// Short text description for event records (`"<<><<"`, `"circle"`).
    pub fn describe(&self) -> String {
        match self {
            StimulusType::Blank => "blank".into(),
            StimulusType::Fixation { .. } => "+".into(),
            StimulusType::Circle { .. } => "circle".into(),
            StimulusType::Rectangle { .. } => "rectangle".into(),
            StimulusType::Arrow { direction, .. } => direction.symbol().to_string(),
            StimulusType::Flanker {
                target, flankers, ..
            } => {
                let f = flankers.symbol();
                let t = target.symbol();
                [f, f, t, f, f].iter().collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowDirection {
    pub fn opposite(&self) -> Self {
        match self {
            ArrowDirection::Up => ArrowDirection::Down,
            ArrowDirection::Down => ArrowDirection::Up,
            ArrowDirection::Left => ArrowDirection::Right,
            ArrowDirection::Right => ArrowDirection::Left,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            ArrowDirection::Up => '^',
            ArrowDirection::Down => 'v',
            ArrowDirection::Left => '<',
            ArrowDirection::Right => '>',
        }
    }

    /// Key name conventionally used to report this direction.
    pub fn key_name(&self) -> &'static str {
        match self {
            ArrowDirection::Up => "up",
            ArrowDirection::Down => "down",
            ArrowDirection::Left => "left",
            ArrowDirection::Right => "right",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flanker_description() {
        let s = StimulusType::Flanker {
            target: ArrowDirection::Right,
            flankers: ArrowDirection::Left,
            size: 30.0,
            color: StimulusType::WHITE,
        };
        assert_eq!(s.describe(), "<<><<");
    }
}
