// Provisioning contracts: mirror a port to a capture-visible interface, attach the tc program

mod attach;
pub mod exec;
mod mirror;

pub use attach::{TcAttach, TcHook, hooks_for, tc_filter_args};
pub use mirror::{ErspanMirror, erspan_link_args};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;

use crate::models::JobSpec;

/// Deferred teardown of one acquired resource. Nothing runs until [`Cleanup::run`].
pub struct Cleanup {
    action: BoxFuture<'static, anyhow::Result<()>>,
}

impl Cleanup {
    pub fn new<F>(action: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            action: action.boxed(),
        }
    }

    pub fn noop() -> Self {
        Self::new(async { Ok(()) })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.action.await
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Creates the interface that receives a copy of the port's traffic.
#[async_trait]
pub trait MirrorProvider: Send + Sync {
    /// Returns the interface name and the action that removes it.
    async fn create(&self, spec: &JobSpec) -> anyhow::Result<(String, Cleanup)>;
}

/// Binds the capture/counting program to an interface.
#[async_trait]
pub trait AttachProvider: Send + Sync {
    async fn attach(&self, interface: &str, spec: &JobSpec) -> anyhow::Result<Cleanup>;
}
