//! Element identifier providers.
//!
//! Every element carries a stable identifier stored under a configurable
//! property field. Providers come in two flavors: [`SequenceIdProvider`]
//! reserves ranges from a back-end counter node so inserts need no
//! per-element round-trip, and [`NativeIdProvider`] canonicalizes
//! identifiers the back-end assigned itself.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{Driver, Statement};
use crate::error::{GraphError, Result};
use crate::model::{cypher_label, ElementId, Value};

/// Allocates and canonicalizes element identifiers.
pub trait IdProvider: Send + Sync {
    /// Property field the identifier is stored under.
    fn field_name(&self) -> &str;

    /// Allocates a fresh identifier.
    fn generate(&self) -> Result<ElementId>;

    /// Converts a raw value into canonical identifier form.
    fn canonicalize(&self, raw: &Value) -> Result<ElementId>;
}

/// Provider for identifiers assigned by the back-end itself.
///
/// Canonicalization is identity over the id forms the driver surfaces.
/// Generation is unsupported: element ids are immutable after creation, so
/// an id the back-end would only hand out at commit time cannot name a
/// transient element. Use a [`SequenceIdProvider`] on write paths.
#[derive(Debug, Clone)]
pub struct NativeIdProvider {
    field: String,
}

impl NativeIdProvider {
    /// Creates a provider reading ids from `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl IdProvider for NativeIdProvider {
    fn field_name(&self) -> &str {
        &self.field
    }

    fn generate(&self) -> Result<ElementId> {
        Err(GraphError::UnsupportedFeature(
            "native id provider cannot generate identifiers client-side",
        ))
    }

    fn canonicalize(&self, raw: &Value) -> Result<ElementId> {
        match raw {
            Value::Int(i) => Ok(ElementId::Int(*i)),
            Value::String(s) => Ok(ElementId::Text(s.clone())),
            other => Err(GraphError::user_input(format!(
                "value cannot be used as an element id: {:?}",
                other
            ))),
        }
    }
}

/// Pool-allocating provider backed by a server-side counter node.
///
/// The local state is the pair `(counter, maximum)`: `counter` is the last
/// identifier handed out, `maximum` the top of the reserved pool. The fast
/// path is a single atomic increment; callers contend on the refill mutex
/// only when the pool is exhausted. A transport failure during refill aborts
/// the requesting operation and no identifier from the aborted refill is
/// ever observable.
pub struct SequenceIdProvider {
    driver: Arc<dyn Driver>,
    field: String,
    label: String,
    pool_size: i64,
    counter: AtomicI64,
    maximum: AtomicI64,
    refill: Mutex<()>,
}

impl SequenceIdProvider {
    /// Creates a provider drawing from the counter node labeled `label`.
    pub fn new(
        driver: Arc<dyn Driver>,
        field: impl Into<String>,
        label: impl Into<String>,
        pool_size: i64,
    ) -> Self {
        Self {
            driver,
            field: field.into(),
            label: label.into(),
            pool_size: pool_size.max(1),
            counter: AtomicI64::new(0),
            maximum: AtomicI64::new(0),
            refill: Mutex::new(()),
        }
    }

    /// Statement that atomically advances the counter node and returns the
    /// new top of the reserved range.
    fn allocation_statement(&self) -> Statement {
        let text = format!(
            "MERGE (g:{}) ON CREATE SET g.nextId = 1 ON MATCH SET g.nextId = g.nextId + $poolSize RETURN g.nextId",
            cypher_label(&self.label)
        );
        Statement::new(text).parameter("poolSize", self.pool_size)
    }

    fn allocate_pool(&self) -> Result<i64> {
        let mut session = self.driver.session()?;
        let mut tx = session.begin_transaction()?;
        let result = (|| {
            let mut stream = tx.run(self.allocation_statement())?;
            let record = stream.next().ok_or_else(|| {
                GraphError::transport("sequence allocation returned no rows")
            })??;
            record.get(0)?.as_int()
        })();
        match result {
            Ok(top) => {
                tx.success()?;
                tx.close()?;
                session.close()?;
                debug!(label = %self.label, top, pool = self.pool_size, "reserved id pool");
                Ok(top)
            }
            Err(err) => {
                let _ = tx.failure();
                let _ = tx.close();
                let _ = session.close();
                Err(err)
            }
        }
    }
}

impl IdProvider for SequenceIdProvider {
    fn field_name(&self) -> &str {
        &self.field
    }

    fn generate(&self) -> Result<ElementId> {
        loop {
            let candidate = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            if candidate <= self.maximum.load(Ordering::SeqCst) {
                return Ok(ElementId::Int(candidate));
            }
            let _guard = self.refill.lock();
            // A peer may have refilled while this caller waited on the lock.
            if self.counter.load(Ordering::SeqCst) < self.maximum.load(Ordering::SeqCst) {
                continue;
            }
            let top = self.allocate_pool()?;
            self.counter.store(top - self.pool_size, Ordering::SeqCst);
            self.maximum.store(top, Ordering::SeqCst);
        }
    }

    fn canonicalize(&self, raw: &Value) -> Result<ElementId> {
        match raw {
            Value::Int(i) => Ok(ElementId::Int(*i)),
            Value::String(s) => s.parse::<i64>().map(ElementId::Int).map_err(|_| {
                GraphError::user_input(format!("value is not a sequence id: {:?}", s))
            }),
            other => Err(GraphError::user_input(format!(
                "value cannot be used as an element id: {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for SequenceIdProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceIdProvider")
            .field("field", &self.field)
            .field("label", &self.label)
            .field("pool_size", &self.pool_size)
            .field("counter", &self.counter.load(Ordering::SeqCst))
            .field("maximum", &self.maximum.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_provider_refuses_generation() {
        let provider = NativeIdProvider::new("id");
        assert!(matches!(
            provider.generate(),
            Err(GraphError::UnsupportedFeature(_))
        ));
        assert_eq!(
            provider.canonicalize(&Value::from("node-9")).ok(),
            Some(ElementId::Text("node-9".to_string()))
        );
    }

    #[test]
    fn sequence_canonicalize_parses_numeric_text() {
        // Canonicalization needs no driver round-trip; a stub is enough.
        let provider = SequenceIdProvider::new(
            Arc::new(crate::testkit::StubDriver::new()),
            "id",
            "UniqueIdGenerator",
            10,
        );
        assert_eq!(
            provider.canonicalize(&Value::from("42")).ok(),
            Some(ElementId::Int(42))
        );
        assert!(provider.canonicalize(&Value::from("x42")).is_err());
        assert!(provider.canonicalize(&Value::Bool(true)).is_err());
    }
}
