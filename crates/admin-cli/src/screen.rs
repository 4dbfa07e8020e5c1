//! List state for one admin screen, cached in the shared store.
//!
//! Mutations change the cached list before the request goes out. A failed
//! request puts the list back exactly as it was; a successful one drops
//! every cached list so the next render refetches.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use shared::store::{Keyed, ListState, ListStore, StoreKey};
use shared::Page;

use crate::client::{ApiClient, ApiError};

pub struct Screen<T> {
    store: ListStore<T>,
    key: StoreKey,
}

impl<T> Screen<T>
where
    T: Keyed + Clone + DeserializeOwned,
{
    pub fn new(view: &str, filters: &impl Serialize) -> Self {
        Self {
            store: ListStore::new(),
            key: StoreKey::new(view, filters),
        }
    }

    pub fn list(&self) -> Option<&ListState<T>> {
        self.store.get(&self.key)
    }

    pub fn load(&mut self, page: Page<T>) {
        self.store.load(self.key.clone(), page);
    }

    pub async fn refresh<Q>(&mut self, api: &ApiClient, path: &str, query: &Q) -> Result<(), ApiError>
    where
        Q: Serialize + ?Sized,
    {
        if !self.store.begin_loading(&self.key) {
            return Ok(());
        }
        match api.get_query::<Page<T>, Q>(path, query).await {
            Ok(reply) => {
                self.load(reply.data);
                Ok(())
            }
            Err(e) => {
                self.store.finish_loading(&self.key);
                Err(e)
            }
        }
    }

    pub async fn mutate<R, F, Fut>(&mut self, reducer: F, request: Fut) -> Result<R, ApiError>
    where
        F: FnOnce(&ListState<T>) -> ListState<T>,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let snapshot = self.store.optimistic(&self.key, reducer);
        match request.await {
            Ok(result) => {
                self.store.invalidate_all();
                Ok(result)
            }
            Err(e) => {
                if let Some(snapshot) = snapshot {
                    self.store.rollback(snapshot);
                    tracing::debug!("Restored {} list after failed request", self.key.view());
                }
                Err(e)
            }
        }
    }
}
