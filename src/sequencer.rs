//! Sequencer & signer (§4.D).
//!
//! The only path by which labels enter the log. Guarantees that id
//! assignment (via [`Store::append`]) and live broadcast are observed in a
//! single global order: every write takes the same lock for the whole
//! append-then-publish sequence, so a subscriber can never observe a
//! broadcast for an id it could not also find by scanning the store.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::broadcaster::{Broadcaster, LABELS_STREAM};
use crate::labels::{Draft, Label, LabelError, LabelSigner};
use crate::store::{Store, StoreError, StoredLabel};

pub struct Sequencer {
    store: Arc<dyn Store>,
    signer: LabelSigner,
    broadcaster: Arc<Broadcaster>,
    write_lock: Mutex<()>,
}

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Sequencer {
    pub fn new(store: Arc<dyn Store>, signer: LabelSigner, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            store,
            signer,
            broadcaster,
            write_lock: Mutex::new(()),
        }
    }

    /// `createLabel`: sign and append a single draft, defaulting `src` to
    /// the labeler's own DID and `cts` to now when the caller left them
    /// implicit.
    pub async fn create_label(&self, draft: Draft) -> Result<StoredLabel, SequencerError> {
        let draft = self.default_draft(draft);
        let label = self.signer.sign(draft)?;
        self.append_and_publish(label).await
    }

    /// `createLabels`: produce one non-negating label per `create` entry
    /// and one negating label per `negate` entry, in order. Returns an
    /// empty list if both inputs are empty.
    pub async fn create_labels(
        &self,
        subject_uri: &str,
        subject_cid: Option<&str>,
        create: Vec<String>,
        negate: Vec<String>,
    ) -> Result<Vec<StoredLabel>, SequencerError> {
        let mut out = Vec::with_capacity(create.len() + negate.len());

        for val in create {
            let draft = Draft::new(self.signer.did(), subject_uri, val);
            let draft = match subject_cid {
                Some(cid) => draft.with_cid(cid),
                None => draft,
            };
            out.push(self.create_label(draft).await?);
        }

        for val in negate {
            let draft = Draft::new(self.signer.did(), subject_uri, val).negated();
            let draft = match subject_cid {
                Some(cid) => draft.with_cid(cid),
                None => draft,
            };
            out.push(self.create_label(draft).await?);
        }

        Ok(out)
    }

    fn default_draft(&self, draft: Draft) -> Draft {
        let src = if draft.src.is_empty() {
            self.signer.did().to_string()
        } else {
            draft.src
        };
        let cts = if draft.cts.is_empty() {
            crate::labels::now_iso8601()
        } else {
            draft.cts
        };
        Draft { src, cts, ..draft }
    }

    async fn append_and_publish(&self, label: Label) -> Result<StoredLabel, SequencerError> {
        let _guard = self.write_lock.lock().await;
        let id = self.store.append(&label).await?;
        self.broadcaster
            .publish(LABELS_STREAM, id, label.clone());
        Ok(StoredLabel { id, label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn signer() -> LabelSigner {
        LabelSigner::from_str_key(
            "1111111111111111111111111111111111111111111111111111111111111111",
            "did:web:labeler.example",
        )
        .unwrap()
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(
            Arc::new(InMemoryStore::new()),
            signer(),
            Arc::new(Broadcaster::new(16)),
        )
    }

    #[tokio::test]
    async fn create_label_defaults_src_and_cts() {
        let seq = sequencer();
        let draft = Draft::new("", "did:plc:subject", "spam");
        let stored = seq.create_label(draft).await.unwrap();
        assert_eq!(stored.label.src, "did:web:labeler.example");
        assert!(!stored.label.cts.is_empty());
    }

    #[tokio::test]
    async fn create_labels_produces_create_then_negate_in_order() {
        let seq = sequencer();
        let stored = seq
            .create_labels(
                "did:plc:subject",
                None,
                vec!["spam".to_string()],
                vec!["spam".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].label.neg, None);
        assert_eq!(stored[1].label.neg, Some(true));
        assert!(stored[0].id < stored[1].id);
    }

    #[tokio::test]
    async fn create_labels_with_empty_inputs_returns_empty() {
        let seq = sequencer();
        let stored = seq
            .create_labels("did:plc:subject", None, vec![], vec![])
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn publishes_to_broadcaster_on_append() {
        let broadcaster = Arc::new(Broadcaster::new(16));
        let seq = Sequencer::new(Arc::new(InMemoryStore::new()), signer(), broadcaster.clone());
        let mut rx = broadcaster.subscribe(LABELS_STREAM);
        let stored = seq
            .create_label(Draft::new("", "did:plc:subject", "spam"))
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.seq, stored.id);
    }
}
