/// Declare a data component: a marker type plus its schema.
///
/// Fields are `name: kind` pairs with an optional `= default`; kinds are the
/// built-in field type names (`number`, `boolean`, `text`, `array`,
/// `reference`, `json`).
///
/// ```rust,ignore
/// component! {
///     /// Projectile state.
///     pub struct Projectile {
///         speed: number = 12.5,
///         waypoints: array,
///         payload: json,
///     }
/// }
/// ```
#[macro_export]
macro_rules! component {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $field:ident : $kind:ident $( = $default:expr )? ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::ecs::component::Component for $name {
            fn name() -> &'static str {
                stringify!($name)
            }

            fn schema() -> $crate::ecs::component::Schema {
                #[allow(unused_mut)]
                let mut builder = $crate::ecs::component::Schema::builder();
                $(
                    builder = builder.field(
                        stringify!($field),
                        $crate::ecs::field::builtin(stringify!($kind)),
                        $crate::component!(@default $( $default )?),
                    );
                )*
                builder.finish()
            }
        }
    };
    (@default) => { ::core::option::Option::None };
    (@default $default:expr) => {
        ::core::option::Option::Some($crate::ecs::field::Value::from($default))
    };
}

/// Declare a tag component: a marker type with an empty schema, used purely
/// for query matching.
///
/// ```rust,ignore
/// tag_component!(pub struct Frozen);
/// ```
#[macro_export]
macro_rules! tag_component {
    ($(#[$meta:meta])* $vis:vis struct $name:ident) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::ecs::component::Component for $name {
            fn name() -> &'static str {
                stringify!($name)
            }

            fn schema() -> $crate::ecs::component::Schema {
                $crate::ecs::component::Schema::empty()
            }

            fn kind() -> $crate::ecs::component::Kind {
                $crate::ecs::component::Kind::Tag
            }
        }
    };
}

/// Declare a system-state component: same field syntax as [`component!`],
/// but its presence keeps a removed entity alive until it is detached.
#[macro_export]
macro_rules! system_state_component {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $field:ident : $kind:ident $( = $default:expr )? ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name;

        impl $crate::ecs::component::Component for $name {
            fn name() -> &'static str {
                stringify!($name)
            }

            fn schema() -> $crate::ecs::component::Schema {
                #[allow(unused_mut)]
                let mut builder = $crate::ecs::component::Schema::builder();
                $(
                    builder = builder.field(
                        stringify!($field),
                        $crate::ecs::field::builtin(stringify!($kind)),
                        $crate::component!(@default $( $default )?),
                    );
                )*
                builder.finish()
            }

            fn kind() -> $crate::ecs::component::Kind {
                $crate::ecs::component::Kind::SystemState
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::ecs::component::{Component, Kind};
    use crate::ecs::field::Value;

    component! {
        /// A projectile with mixed field kinds.
        struct Projectile {
            speed: number = 12.5,
            waypoints: array,
            label: text = "unnamed",
        }
    }

    tag_component!(struct Frozen);

    system_state_component! {
        struct GpuHandle {
            handle: reference,
        }
    }

    #[test]
    fn component_macro_builds_schema_with_defaults() {
        // Given
        let schema = Projectile::schema();

        // Then
        assert_eq!(Projectile::name(), "Projectile");
        assert_eq!(Projectile::kind(), Kind::Data);
        assert_eq!(schema.len(), 3);

        let instance = schema.instantiate(crate::ecs::component::Id::new(0));
        assert_eq!(instance.values()[0], Value::from(12.5));
        assert_eq!(instance.values()[1], Value::Array(Vec::new()));
        assert_eq!(instance.values()[2], Value::from("unnamed"));
    }

    #[test]
    fn tag_macro_builds_empty_schema() {
        // Then
        assert_eq!(Frozen::kind(), Kind::Tag);
        assert!(Frozen::schema().is_empty());
    }

    #[test]
    fn system_state_macro_marks_kind() {
        // Then
        assert_eq!(GpuHandle::kind(), Kind::SystemState);
        assert_eq!(GpuHandle::schema().len(), 1);
    }
}
