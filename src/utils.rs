//! Label helpers shared by the exporter and the metadata writer.

use crate::constants::sanitize::LABEL_REPLACEMENTS;
use crate::types::ArtifactId;

/// Map a label to a filesystem-safe artifact identifier.
///
/// Spaces become underscores, curly quotes and commas are removed, en-dashes
/// and path separators become hyphens. Applying it twice is a no-op.
pub fn sanitize_label(label: &str) -> ArtifactId {
    let mut sanitized = String::with_capacity(label.len());
    for ch in label.chars() {
        match LABEL_REPLACEMENTS.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => sanitized.push_str(to),
            None => sanitized.push(ch),
        }
    }
    sanitized
}
