use super::domain::{Acknowledgment, Document, PersonId};
use super::repository::{ComplianceReads, RepositoryError};

/// The person's most recent acknowledgment of any version of the document.
/// Ties on timestamp resolve to the higher version.
pub fn latest_acknowledgment<R: ComplianceReads>(
    reads: &R,
    person: &PersonId,
    document: &Document,
) -> Result<Option<Acknowledgment>, RepositoryError> {
    let acks = reads.acknowledgments_for(person, &document.id)?;
    Ok(acks
        .into_iter()
        .max_by(|a, b| a.acked_at.cmp(&b.acked_at).then(a.version.cmp(&b.version))))
}

/// Whether the person's latest acknowledgment matches the document's current
/// version. Publishing a new version makes every prior acknowledgment stale
/// immediately; staleness is a pure version comparison at query time, no
/// acknowledgment rows are deleted or rewritten.
pub fn is_current<R: ComplianceReads>(
    reads: &R,
    person: &PersonId,
    document: &Document,
) -> Result<bool, RepositoryError> {
    let latest = latest_acknowledgment(reads, person, document)?;
    Ok(latest.map(|ack| ack.version == document.version).unwrap_or(false))
}
