use chrono::NaiveDateTime;

/// Ripeness classes the hosted model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ripeness {
    Ripe,
    Unripe,
    Overripe,
}

impl Ripeness {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ripe" => Some(Ripeness::Ripe),
            "unripe" => Some(Ripeness::Unripe),
            "overripe" => Some(Ripeness::Overripe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ripeness::Ripe => "ripe",
            Ripeness::Unripe => "unripe",
            Ripeness::Overripe => "overripe",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ripeness::Ripe => "Ripe",
            Ripeness::Unripe => "Unripe",
            Ripeness::Overripe => "Overripe",
        }
    }
}

/// A row of the `detections` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub ripe: i64,
    pub unripe: i64,
    pub overripe: i64,
    pub image_path: String,
}

impl DetectionRecord {
    /// The class this record counts, if exactly one slot is set.
    pub fn ripeness(&self) -> Option<Ripeness> {
        match (self.ripe, self.unripe, self.overripe) {
            (1, 0, 0) => Some(Ripeness::Ripe),
            (0, 1, 0) => Some(Ripeness::Unripe),
            (0, 0, 1) => Some(Ripeness::Overripe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDetection {
    pub ripe: i64,
    pub unripe: i64,
    pub overripe: i64,
    pub image_path: String,
}

impl NewDetection {
    pub fn new(ripeness: Ripeness, image_path: impl Into<String>) -> Self {
        let slot = |class: Ripeness| i64::from(ripeness == class);
        NewDetection {
            ripe: slot(Ripeness::Ripe),
            unripe: slot(Ripeness::Unripe),
            overripe: slot(Ripeness::Overripe),
            image_path: image_path.into(),
        }
    }
}
