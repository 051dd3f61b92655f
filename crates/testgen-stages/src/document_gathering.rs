use crate::classify::{classify_attachment, extract_page_links};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use testgen_core::{
    CollaboratorError, DocumentFetcher, HookScope, Material, MaterialCategory, Phase, SourceKind,
    SourceSpec, TaskError, TaskUnit, TicketRecord, Update, WorkflowConfig, WorkflowContext,
};

const CONSOLIDATED_HEADER: &str = "# Consolidated Content for Test Documentation Generation";

/// One source to pull, planned in declaration order
enum Planned {
    /// Already in hand (ticket bodies)
    Inline(Material),
    Fetch {
        source: SourceKind,
        category: Option<MaterialCategory>,
        locator: String,
        label: String,
    },
}

enum Outcome {
    Gathered(Material),
    Empty(String),
    Failed(String, CollaboratorError),
}

/// Fans out over every configured source and merges in declaration order
pub struct DocumentGathering {
    fetcher: Arc<dyn DocumentFetcher>,
    sources: Vec<SourceSpec>,
    fetch_timeout: Duration,
}

impl DocumentGathering {
    pub const ID: &'static str = "document_gathering";

    pub fn new(fetcher: Arc<dyn DocumentFetcher>, config: &WorkflowConfig) -> Self {
        Self {
            fetcher,
            sources: config.sources.clone(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Deterministic markdown digest of `materials`.
    ///
    /// Ordered by source rank, then category, then insertion, so the order
    /// in which categories were resolved does not leak into the output.
    pub fn consolidate(&self, materials: &[Material]) -> String {
        let mut ordered: Vec<&Material> = materials.iter().collect();
        ordered.sort_by_key(|m| (self.rank(m.source), m.category));

        let mut out = String::from(CONSOLIDATED_HEADER);
        for material in ordered {
            out.push_str("\n\n---\n\n");
            out.push_str(&format!("## {}: {}\n", material.source.label(), material.provenance));
            if let Some(category) = material.category {
                out.push_str(&format!("Category: {}\n", category));
            }
            out.push('\n');
            out.push_str(material.content.trim());
        }
        out.push('\n');
        out
    }

    fn rank(&self, source: SourceKind) -> usize {
        let spec = match source {
            SourceKind::TicketBody => SourceSpec::TicketBody,
            SourceKind::ParentTicket => SourceSpec::ParentTicket,
            SourceKind::Attachment => SourceSpec::Attachments,
            SourceKind::LinkedPage => SourceSpec::LinkedPages,
            SourceKind::UserText | SourceKind::UserLocator => return self.sources.len(),
        };
        self.sources
            .iter()
            .position(|s| *s == spec)
            .unwrap_or(self.sources.len())
    }

    fn plan(&self, ticket: &TicketRecord, parent: Option<&TicketRecord>) -> Vec<Planned> {
        let mut planned = Vec::new();
        let tickets: Vec<&TicketRecord> = std::iter::once(ticket).chain(parent).collect();

        for spec in &self.sources {
            match spec {
                SourceSpec::TicketBody => {
                    if !ticket.body.trim().is_empty() {
                        planned.push(Planned::Inline(ticket_material(SourceKind::TicketBody, ticket)));
                    }
                }
                SourceSpec::ParentTicket => {
                    if let Some(parent) = parent.filter(|p| !p.body.trim().is_empty()) {
                        planned.push(Planned::Inline(ticket_material(SourceKind::ParentTicket, parent)));
                    }
                }
                SourceSpec::Attachments => {
                    let mut seen: Vec<&str> = Vec::new();
                    for attachment in tickets.iter().flat_map(|t| t.attachments.iter()) {
                        let Some(category) = classify_attachment(&attachment.filename) else {
                            tracing::debug!(file = %attachment.filename, "unclassified attachment skipped");
                            continue;
                        };
                        if seen.contains(&attachment.locator.as_str()) {
                            continue;
                        }
                        seen.push(&attachment.locator);
                        planned.push(Planned::Fetch {
                            source: SourceKind::Attachment,
                            category: Some(category),
                            locator: attachment.locator.clone(),
                            label: attachment.filename.clone(),
                        });
                    }
                }
                SourceSpec::LinkedPages => {
                    let mut links: Vec<String> = Vec::new();
                    for link in tickets.iter().flat_map(|t| extract_page_links(&t.body)) {
                        if !links.contains(&link) {
                            links.push(link);
                        }
                    }
                    planned.extend(links.into_iter().map(|link| Planned::Fetch {
                        source: SourceKind::LinkedPage,
                        category: Some(MaterialCategory::SupplementaryPages),
                        label: link.clone(),
                        locator: link,
                    }));
                }
            }
        }
        planned
    }

    async fn gather_one(&self, planned: &Planned, hooks: &HookScope) -> Outcome {
        let (source, category, locator, label) = match planned {
            Planned::Inline(material) => return Outcome::Gathered(material.clone()),
            Planned::Fetch {
                source,
                category,
                locator,
                label,
            } => (*source, *category, locator, label),
        };

        let timeout = self.fetch_timeout;
        let fetched = hooks
            .call(Self::ID, "document_fetcher", locator.clone(), async {
                match tokio::time::timeout(timeout, self.fetcher.fetch(locator)).await {
                    Ok(result) => result,
                    Err(_) => Err(CollaboratorError::Timeout(format!(
                        "{} did not answer within {}ms",
                        locator,
                        timeout.as_millis()
                    ))),
                }
            })
            .await;

        match fetched {
            Ok(text) if text.trim().is_empty() => Outcome::Empty(label.clone()),
            Ok(text) => {
                let material = Material::new(source, text, locator.clone());
                Outcome::Gathered(match category {
                    Some(category) => material.with_category(category),
                    None => material,
                })
            }
            Err(err) => Outcome::Failed(label.clone(), err),
        }
    }
}

fn ticket_material(source: SourceKind, ticket: &TicketRecord) -> Material {
    let content = format!(
        "# {}: {}\n\n**Type**: {}\n\n{}",
        ticket.key,
        ticket.title,
        ticket.issue_type,
        ticket.body.trim()
    );
    Material::new(source, content, ticket.key.clone())
}

#[async_trait]
impl TaskUnit for DocumentGathering {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn phase(&self) -> Phase {
        Phase::Gathering
    }

    async fn run(&self, ctx: &WorkflowContext, hooks: &HookScope) -> Result<Update, TaskError> {
        let ticket = ctx
            .ticket()
            .ok_or_else(|| TaskError::Permanent("gathering started before ticket analysis".into()))?;
        let planned = self.plan(ticket, ctx.parent_ticket());

        let outcomes = join_all(planned.iter().map(|p| self.gather_one(p, hooks))).await;

        let fetches = planned
            .iter()
            .filter(|p| matches!(p, Planned::Fetch { .. }))
            .count();
        let mut materials = Vec::new();
        let mut issues = Vec::new();
        let mut transient_failures = 0;

        for outcome in outcomes {
            match outcome {
                Outcome::Gathered(material) => {
                    tracing::debug!(source = material.source.label(), provenance = %material.provenance, "material gathered");
                    materials.push(material);
                }
                Outcome::Empty(label) => {
                    issues.push(format!("{}: no text could be extracted", label));
                }
                Outcome::Failed(label, err) => {
                    if err.is_transient() {
                        transient_failures += 1;
                    }
                    tracing::warn!(source = %label, error = %err, "source failed");
                    issues.push(format!("{}: {}", label, err));
                }
            }
        }

        if fetches > 0 && transient_failures == fetches && materials.is_empty() {
            return Err(TaskError::Transient(format!(
                "all {} document sources failed: {}",
                fetches,
                issues.join("; ")
            )));
        }

        let consolidated = self.consolidate(&materials);
        Ok(Update::Gathering {
            materials,
            issues,
            consolidated,
        })
    }
}
