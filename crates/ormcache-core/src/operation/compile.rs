//! Compiling operations into the store IR.

use ormcache_proto::{CompiledQuery, FilterBuilder, FilterNode, FilterOp, StoreFilter};

use super::Operation;
use crate::error::Error;
use crate::order_by::OrderBy;

impl<E> Operation<E> {
    /// Compile into a query for `entity`.
    ///
    /// `Operation::None` has no store form and is rejected; callers answer it
    /// with an empty result instead.
    pub fn compile(
        &self,
        entity: &str,
        order_by: Option<&OrderBy<E>>,
    ) -> Result<CompiledQuery, Error> {
        let mut query = CompiledQuery::new(entity, self.compile_filter()?);
        if let Some(order_by) = order_by {
            for spec in order_by.to_specs() {
                query = query.with_order(spec);
            }
        }
        Ok(query)
    }

    /// Compile the predicate alone.
    pub fn compile_filter(&self) -> Result<StoreFilter, Error> {
        if self.is_all() {
            return Ok(StoreFilter::all());
        }
        let mut builder = FilterBuilder::new();
        let root = self.push_filter(&mut builder)?;
        Ok(builder.finish(root)?)
    }

    fn push_filter(&self, builder: &mut FilterBuilder) -> Result<u32, Error> {
        match self {
            Operation::All => Ok(builder.push(FilterNode::All)),
            Operation::None => Err(Error::unsupported(
                "none",
                "an operation matching nothing has no store form",
            )),
            Operation::Atomic(op) => Ok(builder.predicate(
                op.attribute().name(),
                op.kind().filter_op(),
                op.parameter().values(),
            )),
            Operation::And(ops) => {
                let children = ops
                    .iter()
                    .map(|op| op.push_filter(builder))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(builder.push(FilterNode::And(children)))
            }
            Operation::Or(ops) => {
                let children = ops
                    .iter()
                    .map(|op| op.push_filter(builder))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(builder.push(FilterNode::Or(children)))
            }
        }
    }

    /// Store operators the compiled filter uses, deduplicated.
    pub fn filter_ops(&self) -> Vec<FilterOp> {
        let mut ops = Vec::new();
        self.for_each_atomic(&mut |atomic| {
            let op = atomic.kind().filter_op();
            if !ops.contains(&op) {
                ops.push(op);
            }
        });
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::TypedAttribute;
    use ormcache_proto::{OrderDirection, Value};

    struct Order {
        user_id: i32,
        note: Option<String>,
    }

    fn user_id() -> TypedAttribute<Order, i32> {
        TypedAttribute::new("Order", "userId", |o: &Order| Some(o.user_id))
    }

    fn note() -> TypedAttribute<Order, String> {
        TypedAttribute::new("Order", "note", |o: &Order| o.note.clone())
    }

    #[test]
    fn test_compile_tree() {
        let op = user_id().in_([1, 2]).and(&note().is_null().or(&note().like("a%")));
        let query = op.compile("Order", Some(&user_id().descending_order_by())).unwrap();

        assert_eq!(query.entity, "Order");
        assert_eq!(query.filter.predicate_count(), 3);
        assert!(matches!(
            query.filter.root(),
            Ok(FilterNode::And(children)) if children.len() == 2
        ));
        assert_eq!(query.order_by.len(), 1);
        assert_eq!(query.order_by[0].direction, OrderDirection::Desc);

        let first = query.filter.node(0).unwrap();
        assert!(matches!(
            first,
            FilterNode::Predicate { field, op: FilterOp::In, values }
                if field == "userId" && values == &vec![Value::Int32(1), Value::Int32(2)]
        ));
    }

    #[test]
    fn test_compile_all_and_none() {
        assert!(Operation::<Order>::All.compile_filter().unwrap().is_all());
        assert!(matches!(
            Operation::<Order>::None.compile("Order", None),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_filter_ops() {
        let op = user_id().eq(1).and(&user_id().eq(2)).and(&note().full_text("x"));
        assert_eq!(op.filter_ops(), vec![FilterOp::Eq, FilterOp::FullText]);
    }
}
