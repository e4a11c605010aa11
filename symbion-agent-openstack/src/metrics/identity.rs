use super::{Accumulator, FieldValue, Fields, Tags, IDENTITY_TOTAL};
use crate::resources::ProjectMap;

/// Project count; nothing when projects are absent or empty
pub fn gather_identity_statistics(acc: &mut dyn Accumulator, projects: Option<&ProjectMap>) {
    let Some(projects) = projects else {
        return;
    };

    if !projects.is_empty() {
        let fields = Fields::from([(
            "projects".to_string(),
            FieldValue::Integer(projects.len() as i64),
        )]);
        acc.add_fields(IDENTITY_TOTAL, fields, Tags::new());
    }
}
