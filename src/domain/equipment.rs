use serde::{Deserialize, Serialize};

/// One piece of equipment the user owns or could select. Identity is the
/// `id` string; selection state is the only field expected to change after
/// creation. Bulk saves replace the whole collection, they never merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EquipmentItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub is_selected: bool,
}

impl EquipmentItem {
    pub fn new(id: &str, name: &str, category: &str) -> Self {
        Self {
            id: id.trim().to_string(),
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            is_selected: false,
        }
    }

    pub fn selected(mut self) -> Self {
        self.is_selected = true;
        self
    }

    pub fn has_valid_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

pub fn normalize_notes(value: Option<&str>) -> Option<String> {
    let trimmed = value.map(str::trim)?;
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
