//! Chat request lifecycle: submit, list and resolve.

use parley_auth::Identity;
use parley_database::{ChatRequest, DatabaseError, RequestRepository};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::types::{ChatError, ChatResult, Decision, Resolution};

#[derive(Clone)]
pub struct RequestLedger {
    requests: RequestRepository,
}

impl RequestLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            requests: RequestRepository::new(pool),
        }
    }

    /// Record a pending request from `sender` to `receiver`.
    ///
    /// Only one pending request may exist per ordered pair; the reverse
    /// direction is tracked separately.
    pub async fn submit(&self, sender: &Identity, receiver: &Identity) -> ChatResult<ChatRequest> {
        if receiver.as_str().trim().is_empty() {
            return Err(ChatError::invalid_target("receiver must not be empty"));
        }
        if sender == receiver {
            return Err(ChatError::invalid_target(
                "cannot send a chat request to yourself",
            ));
        }

        let duplicate = || ChatError::DuplicatePending {
            receiver: receiver.to_string(),
        };

        if self
            .requests
            .find_pending_between(sender.as_str(), receiver.as_str())
            .await?
            .is_some()
        {
            return Err(duplicate());
        }

        // the partial unique index settles concurrent submits the pre-check missed
        match self.requests.create(sender.as_str(), receiver.as_str()).await {
            Ok(request) => Ok(request),
            Err(DatabaseError::Duplicate(_)) => Err(duplicate()),
            Err(error) => Err(error.into()),
        }
    }

    /// Apply the receiver's decision. Accepting opens the room atomically.
    pub async fn resolve(
        &self,
        request_id: &str,
        acting: &Identity,
        decision: Decision,
    ) -> ChatResult<Resolution> {
        let request = self.find(request_id).await?;

        if request.receiver_id != acting.as_str() {
            warn!(request_id, identity = %acting, "resolve attempted by non-receiver");
            return Err(ChatError::forbidden(
                "only the receiver can respond to a chat request",
            ));
        }

        let already_resolved = || ChatError::AlreadyResolved {
            id: request_id.to_owned(),
        };

        if request.status.is_terminal() {
            return Err(already_resolved());
        }

        let resolved = match self.requests.resolve(&request, decision.status()).await {
            Ok(resolved) => resolved,
            Err(DatabaseError::Conflict(_)) => return Err(already_resolved()),
            Err(error) => return Err(error.into()),
        };

        info!(
            request_id,
            identity = %acting,
            ?decision,
            room_id = resolved.room.as_ref().map(|room| room.public_id.as_str()),
            "chat request resolved"
        );

        Ok(Resolution {
            request: resolved.request,
            room: resolved.room,
        })
    }

    /// Pending requests addressed to `identity`, in creation order.
    pub async fn list_pending(&self, identity: &Identity) -> ChatResult<Vec<ChatRequest>> {
        Ok(self.requests.list_pending_for_receiver(identity.as_str()).await?)
    }

    /// Pending requests `identity` has sent and is waiting on.
    pub async fn list_outgoing(&self, identity: &Identity) -> ChatResult<Vec<ChatRequest>> {
        Ok(self.requests.list_pending_from_sender(identity.as_str()).await?)
    }

    /// Fetch a request on behalf of one of its two parties.
    pub async fn get(&self, request_id: &str, viewer: &Identity) -> ChatResult<ChatRequest> {
        let request = self.find(request_id).await?;
        if !request.involves(viewer.as_str()) {
            return Err(ChatError::forbidden("not a party to this chat request"));
        }
        Ok(request)
    }

    async fn find(&self, request_id: &str) -> ChatResult<ChatRequest> {
        self.requests
            .find_by_public_id(request_id)
            .await?
            .ok_or_else(|| ChatError::RequestNotFound {
                id: request_id.to_owned(),
            })
    }
}
