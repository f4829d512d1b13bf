use std::sync::Arc;

use crate::builder::ClientBuilder;
use crate::client::{Capability, Fallback, FallbackFactory};
use crate::components::SetterFactory;
use crate::descriptor::{ClientDescriptor, FallbackSpec, RoutingTarget, TypeRef};
use crate::error::{ClientFactoryError, FallbackMechanism, ScopeError};
use crate::scope::NamedScope;

/// Builds the final client from a configured builder, wiring fallbacks for
/// fault-tolerant builders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Targeter;

impl Targeter {
    /// Build the client for `target`.
    ///
    /// Plain builders ignore the descriptor's fallback. Fault-tolerant builders
    /// pick up a scope-resident [`SetterFactory`] and resolve the fallback
    /// delegate (registered as `T`) or fallback factory (registered as
    /// `dyn FallbackFactory<T>`) by the type name the descriptor carries.
    ///
    /// # Errors
    /// `MissingFallback` / `IncompatibleFallback` when the declared fallback cannot be
    /// resolved as the capability, plus any error from [`ClientBuilder::build`].
    #[allow(clippy::unused_self)]
    pub fn target<T>(
        &self,
        descriptor: &ClientDescriptor,
        builder: ClientBuilder,
        scopes: &NamedScope,
        target: RoutingTarget,
    ) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        if !builder.supports_fallback() {
            return builder.build(target);
        }

        let context_id = descriptor.context_id();
        let builder = if let Some(factory) = scopes.instance::<dyn SetterFactory>(context_id) {
            tracing::debug!(context_id, setter_factory = factory.name(), "using setter factory");
            builder.setter_factory(factory)
        } else {
            builder
        };

        let fallback = match descriptor.fallback_spec() {
            FallbackSpec::None => Fallback::None,
            FallbackSpec::Delegate(ty) => {
                let component = scopes
                    .named_instance::<T>(context_id, ty.name())
                    .map_err(|e| fallback_error::<T>(&e, FallbackMechanism::Fallback, ty, context_id))?;
                Fallback::Delegate(component.into_instance())
            }
            FallbackSpec::Factory(ty) => {
                let component = scopes
                    .named_instance::<dyn FallbackFactory<T>>(context_id, ty.name())
                    .map_err(|e| {
                        fallback_error::<dyn FallbackFactory<T>>(&e, FallbackMechanism::FallbackFactory, ty, context_id)
                    })?;
                Fallback::Factory(component.into_instance())
            }
        };

        builder.build_with_fallback(target, fallback)
    }
}

fn fallback_error<E: ?Sized>(
    err: &ScopeError,
    mechanism: FallbackMechanism,
    fallback_type: &TypeRef,
    context_id: &str,
) -> ClientFactoryError {
    match err {
        ScopeError::TypeMismatch { .. } => ClientFactoryError::IncompatibleFallback {
            mechanism,
            fallback_type: fallback_type.name().to_owned(),
            expected: std::any::type_name::<E>().to_owned(),
            context_id: context_id.to_owned(),
        },
        _ => ClientFactoryError::MissingFallback {
            mechanism,
            fallback_type: fallback_type.name().to_owned(),
            context_id: context_id.to_owned(),
        },
    }
}
