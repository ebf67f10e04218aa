//! Macros shared by the API crate.

/// Implement `FromRef<AppState>` for a field of [`AppState`], so handlers can
/// extract just the piece of state they need.
///
/// ```ignore
/// impl_from_ref!(LifecycleContext, lifecycle);
/// ```
///
/// [`AppState`]: crate::state::AppState
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
