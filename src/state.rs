//! Shared application state.

use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::crypto::did_resolver::DidCache;
use crate::policy::AuthPolicy;
use crate::sequencer::Sequencer;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub labeler_did: Arc<str>,
    pub store: Arc<dyn Store>,
    pub sequencer: Arc<Sequencer>,
    pub broadcaster: Arc<Broadcaster>,
    pub did_cache: Arc<DidCache>,
    pub policy: Arc<dyn AuthPolicy>,
}
