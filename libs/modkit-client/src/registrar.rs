//! Client declarations and their validation into [`ClientDescriptor`]s.

use regex::{Captures, Regex};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::components::BuilderCustomizer;
use crate::descriptor::{ClientDescriptor, FallbackSpec, TypeRef};
use crate::error::{ClientFactoryError, FallbackMechanism};
use crate::normalize::{normalize_path, normalize_url, validate_name};
use crate::scope::ScopeConfiguration;

/// Suffix of the default qualifier, `{context_id}Client`.
pub const DEFAULT_QUALIFIER_SUFFIX: &str = "Client";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static PLACEHOLDER: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").expect("static regex should not panic")
});

/// Resolves `${key}` / `${key:default}` placeholders in declaration attributes.
pub trait PlaceholderResolver: Send + Sync {
    /// Unresolvable placeholders without a default are left as written.
    fn resolve(&self, value: &str) -> String;
}

/// Placeholder resolver backed by an explicit map, then (optionally) the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentResolver {
    values: HashMap<String, String>,
    use_process_env: bool,
}

impl EnvironmentResolver {
    /// Resolve from process environment variables only.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            values: HashMap::new(),
            use_process_env: true,
        }
    }

    /// Resolve from `values` only.
    #[must_use]
    pub fn from_map<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            use_process_env: false,
        }
    }

    /// Also consult the process environment for keys missing from the map.
    #[must_use]
    pub fn with_process_env(mut self) -> Self {
        self.use_process_env = true;
        self
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(v) = self.values.get(key) {
            return Some(v.clone());
        }
        if self.use_process_env {
            return std::env::var(key).ok();
        }
        None
    }
}

impl PlaceholderResolver for EnvironmentResolver {
    fn resolve(&self, value: &str) -> String {
        PLACEHOLDER
            .replace_all(value, |caps: &Captures<'_>| {
                let key = caps[1].trim();
                match (self.lookup(key), caps.get(2)) {
                    (Some(v), _) => v,
                    (None, Some(default)) => default.as_str().to_owned(),
                    (None, None) => {
                        tracing::debug!(placeholder = key, "unresolved placeholder left as is");
                        caps[0].to_owned()
                    }
                }
            })
            .into_owned()
    }
}

/// Raw declaration of a client, as written by the application.
///
/// ```ignore
/// let declaration = ClientDeclaration::for_capability::<dyn UsersApi>()
///     .name("users")
///     .url("${users.url:http://localhost:8080}")
///     .path("api/v1")
///     .fallback::<UsersFallback>();
/// ```
#[derive(Clone)]
pub struct ClientDeclaration {
    client_type: TypeRef,
    value: Option<String>,
    name: Option<String>,
    service_id: Option<String>,
    context_id: Option<String>,
    url: Option<String>,
    path: Option<String>,
    decode404: bool,
    fallback: Option<TypeRef>,
    fallback_factory: Option<TypeRef>,
    configurations: Vec<Arc<dyn ScopeConfiguration>>,
    customizers: Vec<Arc<dyn BuilderCustomizer>>,
    qualifier: Option<String>,
    qualifiers: Vec<String>,
    primary: bool,
}

impl ClientDeclaration {
    #[must_use]
    pub fn new(client_type: TypeRef) -> Self {
        Self {
            client_type,
            value: None,
            name: None,
            service_id: None,
            context_id: None,
            url: None,
            path: None,
            decode404: false,
            fallback: None,
            fallback_factory: None,
            configurations: Vec::new(),
            customizers: Vec::new(),
            qualifier: None,
            qualifiers: Vec::new(),
            primary: true,
        }
    }

    /// Declaration for the capability `T`, usually `dyn SomeApi`.
    #[must_use]
    pub fn for_capability<T: ?Sized + 'static>() -> Self {
        Self::new(TypeRef::interface::<T>())
    }

    /// Service name, used when neither `service_id` nor `name` is set.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Takes precedence over `name` and `value`.
    #[must_use]
    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// Scope and property key; defaults to the name.
    #[must_use]
    pub fn context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn decode404(mut self, decode404: bool) -> Self {
        self.decode404 = decode404;
        self
    }

    /// Fallback delegate of concrete type `F`, registered in the client scope
    /// as the capability under `F`'s type name.
    #[must_use]
    pub fn fallback<F: 'static>(self) -> Self {
        self.fallback_type(TypeRef::of::<F>())
    }

    #[must_use]
    pub fn fallback_type(mut self, fallback: TypeRef) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Fallback factory of concrete type `F`, registered in the client scope
    /// as `dyn FallbackFactory<Capability>` under `F`'s type name.
    #[must_use]
    pub fn fallback_factory<F: 'static>(self) -> Self {
        self.fallback_factory_type(TypeRef::of::<F>())
    }

    #[must_use]
    pub fn fallback_factory_type(mut self, factory: TypeRef) -> Self {
        self.fallback_factory = Some(factory);
        self
    }

    /// Scope configuration applied to this client's scope only.
    #[must_use]
    pub fn configuration(mut self, configuration: impl ScopeConfiguration + 'static) -> Self {
        self.configurations.push(Arc::new(configuration));
        self
    }

    #[must_use]
    pub fn customizer(mut self, customizer: impl BuilderCustomizer + 'static) -> Self {
        self.customizers.push(Arc::new(customizer));
        self
    }

    /// Single qualifier, used when `qualifiers` is empty.
    #[must_use]
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    #[must_use]
    pub fn qualifiers<I, S>(mut self, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.qualifiers = qualifiers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }
}

impl fmt::Debug for ClientDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDeclaration")
            .field("client_type", &self.client_type)
            .field("value", &self.value)
            .field("name", &self.name)
            .field("service_id", &self.service_id)
            .field("context_id", &self.context_id)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("fallback", &self.fallback)
            .field("fallback_factory", &self.fallback_factory)
            .finish_non_exhaustive()
    }
}

/// Validates declarations into descriptors.
pub struct ClientRegistrar<'a> {
    placeholders: &'a dyn PlaceholderResolver,
}

impl<'a> ClientRegistrar<'a> {
    #[must_use]
    pub fn new(placeholders: &'a dyn PlaceholderResolver) -> Self {
        Self { placeholders }
    }

    /// Validate `declaration` and derive its descriptor.
    ///
    /// # Errors
    /// - `ConflictingFallback` if both fallback mechanisms are declared
    /// - `InterfaceFallbackViolation` if a fallback type is interface-only
    /// - `InvalidClientName` if the name or context id is missing or not a legal host
    /// - `MalformedUrl` if the URL cannot be parsed
    pub fn descriptor(&self, declaration: ClientDeclaration) -> Result<ClientDescriptor, ClientFactoryError> {
        let name = self.name(&declaration)?;
        let context_id = non_blank(declaration.context_id.as_deref())
            .map_or_else(|| name.clone(), |raw| self.placeholders.resolve(raw));
        validate_name(&context_id)?;

        let fallback = validate_fallback(&declaration, &context_id)?;

        let url = non_blank(declaration.url.as_deref())
            .map(|raw| normalize_url(&self.placeholders.resolve(raw)))
            .transpose()?
            .filter(|u| !u.is_empty());
        let path = declaration
            .path
            .as_deref()
            .map(|raw| normalize_path(&self.placeholders.resolve(raw)))
            .unwrap_or_default();

        let qualifiers = qualifiers(&declaration, &context_id);

        tracing::debug!(
            client_type = declaration.client_type.name(),
            name,
            context_id,
            url = url.as_deref().unwrap_or("<load-balanced>"),
            path,
            "validated client declaration"
        );

        Ok(ClientDescriptor {
            client_type: declaration.client_type,
            name,
            context_id,
            url,
            path,
            decode404: declaration.decode404,
            fallback,
            qualifiers,
            primary: declaration.primary,
            configurations: declaration.configurations,
            customizers: declaration.customizers,
        })
    }

    fn name(&self, declaration: &ClientDeclaration) -> Result<String, ClientFactoryError> {
        let raw = non_blank(declaration.service_id.as_deref())
            .or_else(|| non_blank(declaration.name.as_deref()))
            .or_else(|| non_blank(declaration.value.as_deref()))
            .ok_or_else(|| ClientFactoryError::InvalidClientName {
                name: String::new(),
                reason: format!(
                    "either 'name' or 'value' must be provided for '{}'",
                    declaration.client_type
                ),
            })?;
        let name = self.placeholders.resolve(raw);
        validate_name(&name)?;
        Ok(name)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn validate_fallback(declaration: &ClientDeclaration, context_id: &str) -> Result<FallbackSpec, ClientFactoryError> {
    match (&declaration.fallback, &declaration.fallback_factory) {
        (Some(fallback), Some(factory)) => Err(ClientFactoryError::ConflictingFallback {
            context_id: context_id.to_owned(),
            fallback: fallback.name().to_owned(),
            fallback_factory: factory.name().to_owned(),
        }),
        (Some(fallback), None) if fallback.is_interface() => Err(ClientFactoryError::InterfaceFallbackViolation {
            mechanism: FallbackMechanism::Fallback,
            type_name: fallback.name().to_owned(),
        }),
        (None, Some(factory)) if factory.is_interface() => Err(ClientFactoryError::InterfaceFallbackViolation {
            mechanism: FallbackMechanism::FallbackFactory,
            type_name: factory.name().to_owned(),
        }),
        (Some(fallback), None) => Ok(FallbackSpec::Delegate(fallback.clone())),
        (None, Some(factory)) => Ok(FallbackSpec::Factory(factory.clone())),
        (None, None) => Ok(FallbackSpec::None),
    }
}

fn qualifiers(declaration: &ClientDeclaration, context_id: &str) -> Vec<String> {
    let explicit: Vec<String> = declaration
        .qualifiers
        .iter()
        .filter(|q| !q.trim().is_empty())
        .cloned()
        .collect();
    if !explicit.is_empty() {
        return explicit;
    }
    let qualifier = non_blank(declaration.qualifier.as_deref())
        .map_or_else(|| format!("{context_id}{DEFAULT_QUALIFIER_SUFFIX}"), str::to_owned);
    vec![qualifier]
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    trait Api {}
    struct ApiFallback;

    fn env() -> EnvironmentResolver {
        EnvironmentResolver::from_map([("users.host", "users.internal"), ("users.path", "/api/")])
    }

    #[test]
    fn placeholders_resolve_with_defaults() {
        let env = env();
        assert_eq!(env.resolve("${users.host}"), "users.internal");
        assert_eq!(env.resolve("http://${users.host}:${port:8080}"), "http://users.internal:8080");
        assert_eq!(env.resolve("${missing}"), "${missing}");
        assert_eq!(env.resolve("${missing:}"), "");
        assert_eq!(env.resolve("plain"), "plain");
    }

    #[test]
    fn name_precedence_and_context_default() {
        let env = env();
        let registrar = ClientRegistrar::new(&env);

        let d = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .value("from-value")
                    .name("from-name")
                    .service_id("from-service-id"),
            )
            .unwrap();
        assert_eq!(d.name(), "from-service-id");
        assert_eq!(d.context_id(), "from-service-id");

        let d = registrar
            .descriptor(ClientDeclaration::for_capability::<dyn Api>().value("users").context_id("users-admin"))
            .unwrap();
        assert_eq!(d.name(), "users");
        assert_eq!(d.context_id(), "users-admin");
        assert_eq!(d.qualifiers(), &["users-adminClient".to_owned()]);
        assert!(d.is_primary());
    }

    #[test]
    fn missing_or_illegal_names_are_rejected() {
        let env = env();
        let registrar = ClientRegistrar::new(&env);
        for declaration in [
            ClientDeclaration::for_capability::<dyn Api>(),
            ClientDeclaration::for_capability::<dyn Api>().name("  "),
            ClientDeclaration::for_capability::<dyn Api>().name("bad name"),
            ClientDeclaration::for_capability::<dyn Api>().name("users").context_id("bad context"),
        ] {
            assert!(matches!(
                registrar.descriptor(declaration),
                Err(ClientFactoryError::InvalidClientName { .. })
            ));
        }
    }

    #[test]
    fn url_and_path_are_resolved_and_normalized() {
        let env = env();
        let d = ClientRegistrar::new(&env)
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .url("${users.host}/")
                    .path("${users.path}"),
            )
            .unwrap();
        assert_eq!(d.url(), Some("http://users.internal"));
        assert_eq!(d.path(), "/api");

        let d = ClientRegistrar::new(&env)
            .descriptor(ClientDeclaration::for_capability::<dyn Api>().name("users").url("   "))
            .unwrap();
        assert_eq!(d.url(), None);
        assert_eq!(d.path(), "");
    }

    #[test]
    fn fallback_rules() {
        let env = env();
        let registrar = ClientRegistrar::new(&env);

        let err = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .fallback::<ApiFallback>()
                    .fallback_factory::<ApiFallback>(),
            )
            .unwrap_err();
        assert!(matches!(err, ClientFactoryError::ConflictingFallback { .. }));

        let err = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .fallback_type(TypeRef::interface::<dyn Api>()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ClientFactoryError::InterfaceFallbackViolation {
                mechanism: FallbackMechanism::Fallback,
                ..
            }
        ));

        let d = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .fallback::<ApiFallback>(),
            )
            .unwrap();
        assert_eq!(d.fallback(), Some(&TypeRef::of::<ApiFallback>()));
        assert!(d.fallback_factory().is_none());
    }

    #[test]
    fn qualifier_defaults() {
        let env = env();
        let registrar = ClientRegistrar::new(&env);

        let d = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .qualifier("single")
                    .qualifiers(["", "  "]),
            )
            .unwrap();
        assert_eq!(d.qualifiers(), &["single".to_owned()]);

        let d = registrar
            .descriptor(
                ClientDeclaration::for_capability::<dyn Api>()
                    .name("users")
                    .qualifier("single")
                    .qualifiers(["a", "", "b"])
                    .primary(false),
            )
            .unwrap();
        assert_eq!(d.qualifiers(), &["a".to_owned(), "b".to_owned()]);
        assert!(!d.is_primary());
    }
}
