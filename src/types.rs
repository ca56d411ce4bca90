/// Category label attached to a record.
/// Examples: `IAB17`, `Sports`, `Books & Literature`
pub type Label = String;
/// Raw record text (dedup identity).
/// Example: `best running shoes for flat feet`
pub type RecordText = String;
/// Identifier of a provenance location (one producer family).
/// Examples: `output_chunks_synthetic`, `output_chunks_natural`, `output_chunks_manual`
pub type LocationId = String;
/// Filesystem-safe identifier derived from a label.
/// Example: `Books_&_Literature`
pub type ArtifactId = String;
/// Warning/log message text.
/// Examples: `label 'IAB9' has average confidence 0.612 (< 0.75)`
pub type LogMessage = String;
