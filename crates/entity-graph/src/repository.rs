//! Repository facade
//!
//! [`Repository`] exposes fetch-all, fetch-by-id, save and delete for one
//! model type over an [`EntityStore`]. Every call spawns one task on the
//! configured runtime and returns a [`Pending`] handle that resolves exactly
//! once. Dropping the handle does not cancel the task.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use entity_store::{EntityId, EntityStore};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::binding::{write_graph, GraphReader};
use crate::decode::DecodeContext;
use crate::encode::EncodeContext;
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::EntityModel;
use crate::obs::{self, TraversalSpan};

/// Repository behaviour switches.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Emit a `repository.record_dropped` warning for every stored record
    /// that does not decode. Counts are always reported.
    pub log_dropped: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { log_dropped: true }
    }
}

/// Result of a spawned repository operation.
///
/// A task that panics resolves as [`RepositoryError::TaskFailed`].
#[must_use = "dropping a Pending detaches the task; await it to observe the result"]
pub struct Pending<T> {
    handle: JoinHandle<RepositoryResult<T>>,
}

impl<T> Pending<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Let the task run to completion without observing its result.
    pub fn detach(self) {}
}

impl<T> Future for Pending<T> {
    type Output = RepositoryResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join)) => {
                Poll::Ready(Err(RepositoryError::TaskFailed(join.to_string())))
            }
        }
    }
}

/// Persistence facade for model type `M` over store `S`.
pub struct Repository<M, S: ?Sized> {
    store: Arc<S>,
    runtime: Handle,
    config: RepositoryConfig,
    _model: PhantomData<fn() -> M>,
}

impl<M, S: ?Sized> Clone for Repository<M, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            runtime: self.runtime.clone(),
            config: self.config.clone(),
            _model: PhantomData,
        }
    }
}

impl<M, S> Repository<M, S>
where
    M: EntityModel,
    S: EntityStore + ?Sized + 'static,
{
    /// Repository whose tasks run on `runtime`.
    pub fn new(store: Arc<S>, runtime: Handle) -> Self {
        Self {
            store,
            runtime,
            config: RepositoryConfig::default(),
            _model: PhantomData,
        }
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Entity type of `M` in the store.
    pub fn entity_type(&self) -> &'static str {
        M::DECLARATION.entity_type
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn spawn<T, F>(&self, operation: &'static str, task: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = RepositoryResult<T>> + Send + 'static,
    {
        let span = obs::operation_span(operation, M::DECLARATION.entity_type);
        Pending {
            handle: self.runtime.spawn(task.instrument(span)),
        }
    }

    /// Every stored `M`. Records that do not decode are left out.
    pub fn fetch_all(&self) -> Pending<Vec<Arc<M>>> {
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        self.spawn("fetch_all", async move {
            let models = load_all::<M, S>(store.as_ref(), &config).await?;
            Ok(models)
        })
    }

    /// The stored `M` with `id`, or `None` if absent or not decodable.
    pub fn fetch_by_id(&self, id: EntityId) -> Pending<Option<Arc<M>>> {
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        self.spawn("fetch_by_id", async move {
            load_one::<M, S>(store.as_ref(), id, &config).await
        })
    }

    /// Upsert `model` and every model reachable from it in one commit.
    pub fn save(&self, model: Arc<M>) -> Pending<Arc<M>> {
        let store = Arc::clone(&self.store);
        self.spawn("save", async move {
            store_graph::<M, S>(store.as_ref(), model.as_ref()).await?;
            Ok(model)
        })
    }

    /// Remove the stored `M` with `model`'s id. Resolves to the number of
    /// records removed; absence is `Ok(0)`.
    pub fn delete(&self, model: &M) -> Pending<u64> {
        let store = Arc::clone(&self.store);
        let id = model.id();
        self.spawn("delete", async move {
            let entity_type = M::DECLARATION.entity_type;
            let removed = store.delete(entity_type, &id).await?;
            obs::emit_deleted(entity_type, &id, removed);
            Ok(removed)
        })
    }
}

async fn load_all<M, S>(store: &S, config: &RepositoryConfig) -> RepositoryResult<Vec<Arc<M>>>
where
    M: EntityModel,
    S: EntityStore + ?Sized,
{
    let entity_type = M::DECLARATION.entity_type;
    let records = store.fetch_all(entity_type).await?;

    let mut reader = GraphReader::new(store);
    let mut roots = Vec::with_capacity(records.len());
    for record in records {
        roots.push(reader.read(record).await?);
    }
    let graph = reader.into_graph();

    let span = TraversalSpan::enter("decode", entity_type);
    let mut ctx = DecodeContext::new(&graph);
    let mut models = Vec::with_capacity(roots.len());
    let mut dropped = 0;
    for root in roots {
        match M::decode(root, &mut ctx) {
            Ok(model) => models.push(model),
            Err(err) => {
                dropped += 1;
                if config.log_dropped {
                    obs::emit_record_dropped(entity_type, &root, &err);
                }
            }
        }
    }
    span.finish(ctx.decoded());

    obs::emit_fetched(entity_type, models.len(), dropped);
    Ok(models)
}

async fn load_one<M, S>(
    store: &S,
    id: EntityId,
    config: &RepositoryConfig,
) -> RepositoryResult<Option<Arc<M>>>
where
    M: EntityModel,
    S: EntityStore + ?Sized,
{
    let entity_type = M::DECLARATION.entity_type;
    let Some(record) = store.fetch_by_id(entity_type, &id).await? else {
        obs::emit_fetched(entity_type, 0, 0);
        return Ok(None);
    };

    let mut reader = GraphReader::new(store);
    let root = reader.read(record).await?;
    let graph = reader.into_graph();

    let span = TraversalSpan::enter("decode", entity_type);
    let mut ctx = DecodeContext::new(&graph);
    let decoded = M::decode(root, &mut ctx);
    span.finish(ctx.decoded());

    match decoded {
        Ok(model) => {
            obs::emit_fetched(entity_type, 1, 0);
            Ok(Some(model))
        }
        Err(err) => {
            if config.log_dropped {
                obs::emit_record_dropped(entity_type, &root, &err);
            }
            obs::emit_fetched(entity_type, 0, 1);
            Ok(None)
        }
    }
}

async fn store_graph<M, S>(store: &S, model: &M) -> RepositoryResult<()>
where
    M: EntityModel,
    S: EntityStore + ?Sized,
{
    let entity_type = M::DECLARATION.entity_type;
    let id = model.id();

    let graph = {
        let span = TraversalSpan::enter("encode", entity_type);
        let mut ctx = EncodeContext::new();
        model.encode(&mut ctx);
        span.finish(ctx.graph().len());
        ctx.into_graph()
    };

    let result = async {
        let (_, unit) = write_graph(store, &graph, id).await?;
        let written = unit.commit().await?;
        Ok::<_, RepositoryError>(written)
    }
    .await;

    match result {
        Ok(written) => {
            obs::emit_saved(entity_type, &id, written);
            Ok(())
        }
        Err(err) => {
            obs::emit_save_failed(entity_type, &id, &err);
            Err(err)
        }
    }
}
