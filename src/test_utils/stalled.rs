use std::future::pending;

use async_trait::async_trait;

use crate::Acl;
use crate::Coordinator;
use crate::CreateMode;
use crate::OneShotWatch;
use crate::Result;
use crate::Stat;

/// A service that accepts every call and never answers.
#[derive(Debug, Default)]
pub struct StalledCoordinator;

#[async_trait]
impl Coordinator for StalledCoordinator {
    async fn read(
        &self,
        _path: &str,
    ) -> Result<(Vec<u8>, Stat)> {
        pending().await
    }

    async fn read_and_watch(
        &self,
        _path: &str,
    ) -> Result<(Vec<u8>, Stat, OneShotWatch)> {
        pending().await
    }

    async fn children(
        &self,
        _path: &str,
    ) -> Result<Vec<String>> {
        pending().await
    }

    async fn children_and_watch(
        &self,
        _path: &str,
    ) -> Result<(Vec<String>, OneShotWatch)> {
        pending().await
    }

    async fn exists(
        &self,
        _path: &str,
    ) -> Result<Option<Stat>> {
        pending().await
    }

    async fn create(
        &self,
        _path: &str,
        _data: Vec<u8>,
        _mode: CreateMode,
        _acl: &[Acl],
    ) -> Result<Stat> {
        pending().await
    }

    async fn update(
        &self,
        _path: &str,
        _data: Vec<u8>,
        _expected_version: i32,
    ) -> Result<Stat> {
        pending().await
    }

    async fn delete(
        &self,
        _path: &str,
        _expected_version: i32,
    ) -> Result<()> {
        pending().await
    }
}
