//! Create-or-update writes guarded by the node's data version.

use std::sync::Arc;

use tracing::debug;
use tracing::trace;

use crate::path::ancestors;
use crate::path::validate_path;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Acl;
use crate::BackoffPolicy;
use crate::Codec;
use crate::CoordinationError;
use crate::Coordinator;
use crate::CreateMode;
use crate::Error;
use crate::Result;
use crate::Stat;
use crate::WriteConfig;

/// Writes a value whether or not the node exists yet.
///
/// One attempt checks existence, then either updates with the observed
/// version or creates the node. A concurrent writer can make either step
/// fail (version moved, node appeared, node vanished); such attempts are
/// retried under the configured [`BackoffPolicy`]. With
/// [`BackoffPolicy::no_retry`] the conflict is surfaced to the caller.
pub struct Mutator<K: Codec> {
    coordinator: Arc<dyn Coordinator>,
    codec: K,
    write: WriteConfig,
    policy: BackoffPolicy,
}

impl<K: Codec> Mutator<K> {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        codec: K,
        write: WriteConfig,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            coordinator,
            codec,
            write,
            policy,
        }
    }

    /// Serialize `value` and store it at `path`.
    ///
    /// # Errors
    /// - [`crate::CodecError`] when `value` cannot be serialized; nothing is written
    /// - [`CoordinationError::VersionConflict`] when retries are exhausted
    /// - [`CoordinationError::NotFound`] when the parent is missing and
    ///   `create_parents` is off
    pub async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<Stat> {
        let data = self.codec.encode(value)?;
        self.put_raw(path, data).await
    }

    /// Store pre-encoded bytes at `path`.
    pub async fn put_raw(
        &self,
        path: &str,
        data: Vec<u8>,
    ) -> Result<Stat> {
        validate_path(path)?;
        let stat = task_with_timeout_and_exponential_backoff(
            path,
            || self.create_or_update(path, data.clone()),
            self.policy,
            |e| match e {
                // a missing parent will not appear by retrying
                Error::Coordination(CoordinationError::NotFound { path: missing }) => missing == path,
                e => e.is_retryable_write(),
            },
        )
        .await?;
        debug!(path, version = stat.version, "put committed");
        Ok(stat)
    }

    async fn create_or_update(
        &self,
        path: &str,
        data: Vec<u8>,
    ) -> Result<Stat> {
        match self.coordinator.exists(path).await? {
            Some(stat) => {
                trace!(path, expected = stat.version, "updating existing node");
                self.coordinator.update(path, data, stat.version).await
            }
            None => {
                if self.write.create_parents {
                    self.ensure_parents(path).await?;
                }
                trace!(path, "creating node");
                self.coordinator
                    .create(path, data, self.write.create_mode(), &Acl::world_all())
                    .await
            }
        }
    }

    /// Create every missing ancestor of `path` with an empty payload.
    ///
    /// Ancestors are always persistent: an ephemeral parent would take its
    /// children down with the session.
    pub async fn ensure_parents(
        &self,
        path: &str,
    ) -> Result<()> {
        for ancestor in ancestors(path) {
            if self.coordinator.exists(ancestor).await?.is_some() {
                continue;
            }
            match self
                .coordinator
                .create(
                    ancestor,
                    Vec::new(),
                    CreateMode::Persistent,
                    &Acl::world_all(),
                )
                .await
            {
                Ok(_) => trace!(path = ancestor, "created parent"),
                Err(Error::Coordination(CoordinationError::NodeExists { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
