//! The stream pipeline.
//!
//! A stream is a lazy, pull-based sequence of records: one source, a
//! linear chain of operators appended with [`Stream::pipe`], and a
//! terminal drain. Records flow one at a time; operators transform,
//! filter, or side-effect against the execution context's transaction.
//! Errors short-circuit the stream, and cancellation is checked at every
//! pull boundary.

pub mod index;
pub mod table;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use oolong_common::types::{Document, Key};
use oolong_common::{Error, Result};

use crate::transaction::Transaction;

/// One record flowing through a pipeline: the decoded fields plus a
/// reference to the row's encoded storage key, when it has one.
#[derive(Debug, Clone)]
pub struct Record {
    /// The decoded fields.
    pub doc: Document,
    /// The encoded storage key of the row this record came from or was
    /// written to.
    pub key: Option<Key>,
}

impl Record {
    /// Creates a keyless record, as emitted by value sources.
    #[must_use]
    pub fn new(doc: Document) -> Self {
        Self { doc, key: None }
    }

    /// Creates a record bound to a stored row.
    #[must_use]
    pub fn with_key(doc: Document, key: Key) -> Self {
        Self {
            doc,
            key: Some(key),
        }
    }

    /// Returns the record's key, or an error for operators that require
    /// one.
    pub fn require_key(&self) -> Result<&Key> {
        self.key
            .as_ref()
            .ok_or_else(|| Error::invalid("record has no storage key"))
    }
}

/// Cooperative cancellation shared between a statement and its caller.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Running pipelines observe it at the next
    /// pull boundary; the transaction is left to the caller to roll back.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context threaded through every operator.
pub struct ExecContext<'a> {
    /// The active transaction.
    pub tx: &'a Transaction,
    /// Cancellation token honored at pull boundaries.
    pub cancellation: Cancellation,
}

impl<'a> ExecContext<'a> {
    /// Creates a context with a fresh cancellation token.
    #[must_use]
    pub fn new(tx: &'a Transaction) -> Self {
        Self {
            tx,
            cancellation: Cancellation::new(),
        }
    }

    /// Creates a context observing an existing token.
    #[must_use]
    pub fn with_cancellation(tx: &'a Transaction, cancellation: Cancellation) -> Self {
        Self { tx, cancellation }
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// A record source rooting a stream.
pub trait Source {
    /// Pulls the next record, or `None` when exhausted.
    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Record>>;
}

/// An operator applied to each record of the upstream chain.
pub trait Operator {
    /// Processes one record; `None` drops it from the stream.
    fn apply(&mut self, ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>>;
}

/// A linear operator pipeline rooted at one source.
pub struct Stream {
    source: Box<dyn Source>,
    ops: Vec<Box<dyn Operator>>,
}

impl Stream {
    /// Roots a new stream at `source`.
    #[must_use]
    pub fn new(source: impl Source + 'static) -> Self {
        Self {
            source: Box::new(source),
            ops: Vec::new(),
        }
    }

    /// Appends `op` to the chain and returns the new tail.
    #[must_use]
    pub fn pipe(mut self, op: impl Operator + 'static) -> Self {
        self.ops.push(Box::new(op));
        self
    }

    /// Pulls the next record through the whole chain.
    pub fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Record>> {
        'source: loop {
            ctx.check_cancelled()?;
            let Some(mut record) = self.source.next(ctx)? else {
                return Ok(None);
            };
            for op in &mut self.ops {
                ctx.check_cancelled()?;
                match op.apply(ctx, record)? {
                    Some(next) => record = next,
                    None => continue 'source,
                }
            }
            return Ok(Some(record));
        }
    }

    /// Drains the stream without materializing output, returning the
    /// number of records that reached the sink.
    pub fn drain(&mut self, ctx: &ExecContext<'_>) -> Result<u64> {
        let mut count = 0;
        while self.next(ctx)?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

/// A source emitting a fixed list of documents; used by INSERT.
pub struct ValuesSource {
    docs: std::vec::IntoIter<Document>,
}

impl ValuesSource {
    /// Creates a source over `docs`.
    #[must_use]
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            docs: docs.into_iter(),
        }
    }
}

impl Source for ValuesSource {
    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<Record>> {
        Ok(self.docs.next().map(Record::new))
    }
}

/// Drops records whose predicate does not hold.
pub struct FilterOp {
    predicate: crate::expr::Expr,
}

impl FilterOp {
    /// Creates a filter over `predicate`.
    #[must_use]
    pub fn new(predicate: crate::expr::Expr) -> Self {
        Self { predicate }
    }
}

impl Operator for FilterOp {
    fn apply(&mut self, _ctx: &ExecContext<'_>, record: Record) -> Result<Option<Record>> {
        use oolong_common::types::Value;

        let keep = matches!(
            self.predicate.eval(&crate::expr::Env::new(&record.doc))?,
            Value::Bool(true)
        );
        Ok(keep.then_some(record))
    }
}

/// Sets a field path to the value of an expression; used by UPDATE.
pub struct SetOp {
    path: String,
    expr: crate::expr::Expr,
}

impl SetOp {
    /// Creates an operator assigning `expr` to `path` on every record.
    #[must_use]
    pub fn new(path: impl Into<String>, expr: crate::expr::Expr) -> Self {
        Self {
            path: path.into(),
            expr,
        }
    }
}

impl Operator for SetOp {
    fn apply(&mut self, _ctx: &ExecContext<'_>, mut record: Record) -> Result<Option<Record>> {
        // The expression observes the record as it stands, so earlier
        // SET clauses are visible to later ones.
        let value = self.expr.eval(&crate::expr::Env::new(&record.doc))?;
        crate::expr::set_path(&mut record.doc, &self.path, value)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Options};
    use crate::expr::{CompareOp, Expr};
    use oolong_common::doc;
    use oolong_common::types::Value;

    fn docs() -> Vec<Document> {
        vec![
            doc! { "a" => Value::Int(1) },
            doc! { "a" => Value::Int(2) },
            doc! { "a" => Value::Int(3) },
        ]
    }

    #[test]
    fn test_stream_filter_and_drain() {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(false).unwrap();
        let ctx = ExecContext::new(&tx);

        let mut stream = Stream::new(ValuesSource::new(docs())).pipe(FilterOp::new(
            Expr::compare(CompareOp::Gt, Expr::field("a"), Expr::literal(Value::Int(1))),
        ));
        assert_eq!(stream.drain(&ctx).unwrap(), 2);
    }

    #[test]
    fn test_stream_cancellation() {
        let db = Database::open(":memory:", Options::default()).unwrap();
        let tx = db.begin(false).unwrap();
        let ctx = ExecContext::new(&tx);
        ctx.cancellation.cancel();

        let mut stream = Stream::new(ValuesSource::new(docs()));
        let err = stream.drain(&ctx).unwrap_err();
        assert_eq!(err.kind(), oolong_common::ErrorKind::Cancelled);
    }
}
