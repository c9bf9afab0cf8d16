//! Declarative macro for ergonomic shape construction
//!
//! Building nested [`Shape`](crate::schema::Shape) values by hand means a lot
//! of `Shape::object([...])` and `Box::new` noise; the [`shape!`](crate::shape)
//! macro writes the tree the way the data looks.

/// Build a [`Shape`](crate::schema::Shape) from a declarative literal.
///
/// Bare identifiers name primitive shapes (`String`, `Integer`, `Float`,
/// `Boolean`, `Any`); braces build a strict object; `optional`, `array`, and
/// `map` prefixes build the corresponding wrapper and must be parenthesized
/// when used as an object field value.
///
/// # Example
///
/// ```
/// use statebus_core::shape;
///
/// let order_placed = shape! {
///     "order_id": String,
///     "quantity": Integer,
///     "coupon": (optional String),
///     "line_items": (array { "sku": String, "price": Float }),
///     "labels": (map String),
/// };
/// ```
#[macro_export]
macro_rules! shape {
    (String) => {
        $crate::schema::Shape::String
    };
    (Integer) => {
        $crate::schema::Shape::Integer
    };
    (Float) => {
        $crate::schema::Shape::Float
    };
    (Boolean) => {
        $crate::schema::Shape::Boolean
    };
    (Any) => {
        $crate::schema::Shape::Any
    };
    (optional $($inner:tt)+) => {
        $crate::schema::Shape::Optional(::std::boxed::Box::new($crate::shape!($($inner)+)))
    };
    (array $($inner:tt)+) => {
        $crate::schema::Shape::Array(::std::boxed::Box::new($crate::shape!($($inner)+)))
    };
    (map $($inner:tt)+) => {
        $crate::schema::Shape::MapOf(::std::boxed::Box::new($crate::shape!($($inner)+)))
    };
    (( $($inner:tt)+ )) => {
        $crate::shape!($($inner)+)
    };
    // Nested object group, as recursion delivers it (`(array { ... })`).
    ({ $($field:literal : $value:tt),* $(,)? }) => {
        $crate::shape!($($field : $value),*)
    };
    // Top-level invocation: `shape! { "name": String }` presents the bare
    // field list, the invocation braces having been consumed as the macro's
    // own delimiters. Also covers the empty object, `shape! {}`.
    ($($field:literal : $value:tt),* $(,)?) => {{
        let mut fields = ::std::collections::BTreeMap::new();
        $(
            fields.insert(::std::string::String::from($field), $crate::shape!($value));
        )*
        $crate::schema::Shape::Object(fields)
    }};
}

#[cfg(test)]
mod tests {
    use crate::schema::Shape;

    #[test]
    fn literal_matches_programmatic_construction() {
        let via_macro = shape! {
            "name": String,
            "score": Integer,
            "nested": { "flag": Boolean },
            "tags": (array String),
            "meta": (map Any),
            "nick": (optional String),
        };
        let by_hand = Shape::object([
            ("name", Shape::String),
            ("score", Shape::Integer),
            ("nested", Shape::object([("flag", Shape::Boolean)])),
            ("tags", Shape::array(Shape::String)),
            ("meta", Shape::map_of(Shape::Any)),
            ("nick", Shape::optional(Shape::String)),
        ]);
        assert_eq!(via_macro, by_hand);
    }

    #[test]
    fn top_level_braces_and_empty_objects_build() {
        // The invocation's own braces are the macro delimiters; the field
        // list arrives bare and must still build an object.
        let single = shape! { "name": String };
        assert_eq!(single, Shape::object([("name", Shape::String)]));

        let empty_object = Shape::Object(::std::collections::BTreeMap::new());
        assert_eq!(shape! {}, empty_object);

        let nested_empty = shape! { "payload": {} };
        assert_eq!(nested_empty, Shape::object([("payload", empty_object)]));
    }

    #[test]
    fn bare_primitive_forms() {
        assert_eq!(shape!(String), Shape::String);
        assert_eq!(shape!(optional Integer), Shape::optional(Shape::Integer));
        assert_eq!(shape!(map Float), Shape::map_of(Shape::Float));
    }
}
