use std::marker::PhantomData;
use std::sync::Arc;

use actix::{Actor, Addr, Handler, Message, SyncArbiter, SyncContext};

use crate::error::Result;
use crate::models::Snapshot;

use super::store::RecordStore;

/// Owns the record store. Started with a single worker so every
/// load-mutate-save cycle runs to completion before the next one starts.
pub struct DbExecutor(pub Arc<dyn RecordStore>);

impl Actor for DbExecutor {
    type Context = SyncContext<Self>;
}

/// Read-only access to a freshly loaded snapshot.
pub struct Query<F, R> {
    f: F,
    _result: PhantomData<fn() -> R>,
}

impl<F, R> Query<F, R> {
    pub fn new(f: F) -> Self {
        Query { f, _result: PhantomData }
    }
}

impl<F, R> Message for Query<F, R>
where
    F: FnOnce(&Snapshot) -> Result<R>,
    R: 'static,
{
    type Result = Result<R>;
}

impl<F, R> Handler<Query<F, R>> for DbExecutor
where
    F: FnOnce(&Snapshot) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    type Result = Result<R>;

    fn handle(&mut self, msg: Query<F, R>, _: &mut Self::Context) -> Self::Result {
        let snapshot = self.0.load()?;
        (msg.f)(&snapshot)
    }
}

/// Load, apply, and save the whole snapshot. Nothing is written when the
/// closure fails.
pub struct Transact<F, R> {
    f: F,
    _result: PhantomData<fn() -> R>,
}

impl<F, R> Transact<F, R> {
    pub fn new(f: F) -> Self {
        Transact { f, _result: PhantomData }
    }
}

impl<F, R> Message for Transact<F, R>
where
    F: FnOnce(&mut Snapshot) -> Result<R>,
    R: 'static,
{
    type Result = Result<R>;
}

impl<F, R> Handler<Transact<F, R>> for DbExecutor
where
    F: FnOnce(&mut Snapshot) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    type Result = Result<R>;

    fn handle(&mut self, msg: Transact<F, R>, _: &mut Self::Context) -> Self::Result {
        let mut snapshot = self.0.load()?;
        let result = (msg.f)(&mut snapshot)?;
        self.0.save(&snapshot)?;
        Ok(result)
    }
}

/// Cloneable handle the HTTP layer uses to reach the executor.
#[derive(Clone)]
pub struct Store {
    executor: Addr<DbExecutor>,
}

impl Store {
    /// Must be called from within a running actix system.
    pub fn start(store: Arc<dyn RecordStore>) -> Self {
        let executor = SyncArbiter::start(1, move || DbExecutor(store.clone()));
        Store { executor }
    }

    pub async fn query<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Snapshot) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.executor.send(Query::new(f)).await?
    }

    pub async fn transact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Snapshot) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.executor.send(Transact::new(f)).await?
    }
}
