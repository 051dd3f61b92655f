//! Parent-Epic lookup shared by TicketAnalysis and the missing-input resolver
use std::time::Duration;
use testgen_core::{CollaboratorError, HookScope, TicketClient, TicketRecord};

/// Fetch the declared parent of `ticket`, one hop only.
///
/// Returns `Ok(None)` when there is no parent or the parent is not an Epic.
/// A parent that does not answer within `timeout` is a `Timeout` error.
pub async fn lookup_parent_epic(
    tickets: &dyn TicketClient,
    hooks: &HookScope,
    unit: &'static str,
    ticket: &TicketRecord,
    timeout: Duration,
) -> Result<Option<TicketRecord>, CollaboratorError> {
    let parent_id = match ticket.parent_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.trim(),
        _ => return Ok(None),
    };

    let parent = hooks
        .call(unit, "ticket_client", format!("fetch {}", parent_id), async {
            tokio::time::timeout(timeout, tickets.fetch(parent_id))
                .await
                .unwrap_or_else(|_| {
                    Err(CollaboratorError::Timeout(format!(
                        "parent {} did not answer within {}ms",
                        parent_id,
                        timeout.as_millis()
                    )))
                })
        })
        .await?;

    if !parent.is_epic() {
        tracing::debug!(ticket = %ticket.key, parent = %parent.key, "parent is not an epic");
        return Ok(None);
    }
    Ok(Some(parent))
}
