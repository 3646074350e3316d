use crate::error::Result;
use infera_storage::KvBackend;
use infera_types::BlockHeight;
use tracing::{info_span, Span};

/// Everything a keeper call may touch for the block being executed.
pub struct ExecutionContext<'a> {
    block_height: BlockHeight,
    store: &'a mut dyn KvBackend,
    span: Span,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(block_height: BlockHeight, store: &'a mut dyn KvBackend) -> Self {
        Self {
            block_height,
            store,
            span: info_span!("block", height = block_height),
        }
    }

    pub fn block_height(&self) -> BlockHeight {
        self.block_height
    }

    pub fn store(&self) -> &dyn KvBackend {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn KvBackend {
        &mut *self.store
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` atomically: its writes are committed only if it returns `Ok`.
    pub fn in_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.store.begin_transaction()?;
        match f(&mut *self) {
            Ok(value) => {
                self.store.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                self.store.rollback_transaction()?;
                Err(err)
            }
        }
    }
}
