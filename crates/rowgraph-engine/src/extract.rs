//! Shaping a list of results into the value a target expects.

use rowgraph_core::{Datum, Error, ObjectFactory, Result, TargetType};

/// A collection target receives the whole list; any other target receives
/// the single element, NULL when empty. More than one element for a
/// single-valued target is a cardinality error.
pub fn extract_object_from_list(
    list: Vec<Datum>,
    target: &TargetType,
    factory: &dyn ObjectFactory,
) -> Result<Datum> {
    if factory.is_collection_type(target) {
        return Ok(Datum::List(list));
    }
    if list.len() > 1 {
        return Err(Error::TooManyResults {
            expected: 1,
            found: list.len(),
        });
    }
    Ok(list.into_iter().next().unwrap_or_else(Datum::null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{DefaultObjectFactory, TypeRegistry, Value};
    use std::sync::Arc;

    fn factory() -> DefaultObjectFactory {
        DefaultObjectFactory::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_collection_target_keeps_list() {
        let list = vec![Datum::from(Value::Int(1)), Datum::from(Value::Int(2))];
        let out =
            extract_object_from_list(list, &TargetType::list(TargetType::I32), &factory()).unwrap();
        assert_eq!(out.as_list().map(<[Datum]>::len), Some(2));
    }

    #[test]
    fn test_single_target() {
        let out = extract_object_from_list(Vec::new(), &TargetType::I32, &factory()).unwrap();
        assert!(out.is_null());

        let out = extract_object_from_list(vec![Datum::from(Value::Int(7))], &TargetType::I32, &factory())
            .unwrap();
        assert_eq!(out, Datum::from(Value::Int(7)));

        let err = extract_object_from_list(
            vec![Datum::null(), Datum::null()],
            &TargetType::I32,
            &factory(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TooManyResults { expected: 1, found: 2 }));
    }
}
