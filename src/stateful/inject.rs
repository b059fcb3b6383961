//! Hierarchical dependency injection
//!
//! Injectors are named scopes with an optional parent. Each holds providers:
//! constructors whose parameters are themselves resolved by type. Lookups
//! walk from the requested scope up through its ancestors, so a child
//! shadows anything its parents provide.
//!
//! A provider builds its value in the scope that owns it, at most once, and
//! the value is then shared by everyone resolving through that scope.
//! Components receive dependencies through [`Injectable::inject`], filling
//! their [`Inject`] fields from a [`Resolver`].

use crate::error::{ConfigError, InjectError};
use crate::web::{Ctx, Render};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;
type Build = Box<dyn Fn(&mut Resolver<'_>) -> Result<Instance, InjectError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    type_id: TypeId,
    tag: Option<String>,
}

impl Key {
    fn of<T: 'static>(tag: Option<&str>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            tag: tag.map(str::to_string),
        }
    }
}

fn label<T>(tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{} (tag {:?})", std::any::type_name::<T>(), tag),
        None => std::any::type_name::<T>().to_string(),
    }
}

struct Slot {
    label: String,
    build: Build,
    value: Mutex<Option<Instance>>,
}

struct Frame {
    injector: String,
    key: Key,
    label: String,
}

/// Name of the injector doing the resolving; every injector provides its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorName(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Injector
// ─────────────────────────────────────────────────────────────────────────────

pub struct Injector {
    name: String,
    parent: Option<Arc<Injector>>,
    slots: RwLock<HashMap<Key, Arc<Slot>>>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("providers", &self.slots.read().len())
            .finish()
    }
}

impl Injector {
    fn new(name: &str, parent: Option<Arc<Injector>>) -> Self {
        let injector = Self {
            name: name.to_string(),
            parent,
            slots: RwLock::new(HashMap::new()),
        };
        let own_name = InjectorName(name.to_string());
        injector.slots.write().insert(
            Key::of::<InjectorName>(None),
            Arc::new(Slot {
                label: label::<InjectorName>(None),
                build: Box::new(move |_| Ok(Arc::new(own_name.clone()) as Instance)),
                value: Mutex::new(None),
            }),
        );
        injector
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Injector>> {
        self.parent.as_ref()
    }

    fn add_slot(&self, key: Key, label: String, build: Build) -> Result<(), InjectError> {
        let mut slots = self.slots.write();
        if slots.contains_key(&key) {
            return Err(InjectError::DuplicateProvider {
                injector: self.name.clone(),
                key: label,
            });
        }
        slots.insert(
            key,
            Arc::new(Slot {
                label,
                build,
                value: Mutex::new(None),
            }),
        );
        Ok(())
    }

    fn instantiate(&self, key: &Key, slot: &Slot, stack: &mut Vec<Frame>) -> Result<Instance, InjectError> {
        // checked before locking: re-entering a slot being built would deadlock
        if let Some(pos) = stack
            .iter()
            .position(|f| f.injector == self.name && f.key == *key)
        {
            let path = stack[pos..]
                .iter()
                .map(|f| f.label.as_str())
                .chain(std::iter::once(slot.label.as_str()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(InjectError::Cycle {
                injector: self.name.clone(),
                path,
            });
        }

        let mut value = slot.value.lock();
        if let Some(existing) = value.as_ref() {
            return Ok(existing.clone());
        }

        stack.push(Frame {
            injector: self.name.clone(),
            key: key.clone(),
            label: slot.label.clone(),
        });
        let built = (slot.build)(&mut Resolver {
            injector: self,
            stack: &mut *stack,
        });
        stack.pop();

        let built = built?;
        tracing::trace!(injector = %self.name, provider = %slot.label, "constructed dependency");
        *value = Some(built.clone());
        Ok(built)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves dependencies within one injector scope
pub struct Resolver<'a> {
    injector: &'a Injector,
    stack: &'a mut Vec<Frame>,
}

impl Resolver<'_> {
    pub fn injector_name(&self) -> &str {
        &self.injector.name
    }

    pub fn resolve<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T, InjectError> {
        self.resolve_key(None)
    }

    pub fn resolve_tagged<T: Clone + Send + Sync + 'static>(&mut self, tag: &str) -> Result<T, InjectError> {
        self.resolve_key(Some(tag))
    }

    /// Fill an injected field
    pub fn fill<T: Clone + Send + Sync + 'static>(&mut self, field: &mut Inject<T>) -> Result<(), InjectError> {
        field.set(self.resolve()?);
        Ok(())
    }

    pub fn fill_tagged<T: Clone + Send + Sync + 'static>(
        &mut self,
        tag: &str,
        field: &mut Inject<T>,
    ) -> Result<(), InjectError> {
        field.set(self.resolve_tagged(tag)?);
        Ok(())
    }

    fn resolve_key<T: Clone + Send + Sync + 'static>(&mut self, tag: Option<&str>) -> Result<T, InjectError> {
        let key = Key::of::<T>(tag);
        let mut current = Some(self.injector);
        while let Some(injector) = current {
            let slot = injector.slots.read().get(&key).cloned();
            if let Some(slot) = slot {
                let instance = injector.instantiate(&key, &slot, self.stack)?;
                return instance
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| InjectError::Unresolved {
                        injector: injector.name.clone(),
                        key: label::<T>(tag),
                    });
            }
            current = injector.parent.as_deref();
        }
        Err(InjectError::Unresolved {
            injector: self.injector.name.clone(),
            key: label::<T>(tag),
        })
    }
}

/// A constructor whose parameters are resolved by type
///
/// Implemented for closures and functions of up to four `Clone` parameters.
pub trait Constructor<Args>: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn construct(&self, resolver: &mut Resolver<'_>) -> Result<Self::Output, InjectError>;
}

macro_rules! impl_constructor {
    ($($arg:ident),*) => {
        impl<F, T, $($arg,)*> Constructor<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> T + Send + Sync + 'static,
            T: Send + Sync + 'static,
            $($arg: Clone + Send + Sync + 'static,)*
        {
            type Output = T;

            #[allow(non_snake_case, unused_variables)]
            fn construct(&self, resolver: &mut Resolver<'_>) -> Result<T, InjectError> {
                $(let $arg = resolver.resolve::<$arg>()?;)*
                Ok((self)($($arg),*))
            }
        }
    };
}

impl_constructor!();
impl_constructor!(A);
impl_constructor!(A, B);
impl_constructor!(A, B, C);
impl_constructor!(A, B, C, D);

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

/// Components that receive dependencies from an injector
pub trait Injectable {
    fn inject(&mut self, resolver: &mut Resolver<'_>) -> Result<(), InjectError> {
        let _ = resolver;
        Ok(())
    }
}

/// Field slot filled by injection, never serialized
///
/// Declare with `#[serde(skip)]`; it deserializes empty and is filled again
/// whenever the component is injected.
pub struct Inject<T>(Option<T>);

impl<T> Default for Inject<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T: Clone> Clone for Inject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => write!(f, "Inject<{}>(set)", std::any::type_name::<T>()),
            None => write!(f, "Inject<{}>(empty)", std::any::type_name::<T>()),
        }
    }
}

impl<T> Inject<T> {
    pub fn get(&self) -> Result<&T, InjectError> {
        self.0
            .as_ref()
            .ok_or(InjectError::NotInjected(std::any::type_name::<T>()))
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// A component already injected, rendering with its injector on the scope
#[derive(Debug, Clone)]
pub struct Injected<C> {
    injector: String,
    component: C,
}

impl<C> Injected<C> {
    pub fn injector(&self) -> &str {
        &self.injector
    }

    pub fn inner(&self) -> &C {
        &self.component
    }
}

impl<C: Render> Render for Injected<C> {
    fn render(&self, ctx: &Ctx) -> anyhow::Result<String> {
        self.component.render(&ctx.with_injector(&self.injector))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency center
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of named injectors
#[derive(Default)]
pub struct DependencyCenter {
    injectors: RwLock<HashMap<String, Arc<Injector>>>,
}

impl fmt::Debug for DependencyCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.injectors.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("DependencyCenter").field("injectors", &names).finish()
    }
}

impl DependencyCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an injector, panicking on configuration errors
    pub fn register_injector(&self, name: &str, parent: Option<&str>) {
        if let Err(e) = self.try_register_injector(name, parent) {
            panic!("failed to register injector: {e}");
        }
    }

    pub fn try_register_injector(&self, name: &str, parent: Option<&str>) -> Result<(), ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::EmptyInjectorName);
        }
        let mut injectors = self.injectors.write();
        if injectors.contains_key(name) {
            return Err(ConfigError::DuplicateInjector(name.to_string()));
        }
        let parent_injector = match parent {
            Some(p) => Some(
                injectors
                    .get(p)
                    .cloned()
                    .ok_or_else(|| ConfigError::ParentNotFound(p.to_string()))?,
            ),
            None => None,
        };
        injectors.insert(name.to_string(), Arc::new(Injector::new(name, parent_injector)));
        tracing::debug!(injector = name, parent = ?parent, "registered injector");
        Ok(())
    }

    pub fn injector(&self, name: &str) -> Result<Arc<Injector>, InjectError> {
        self.injectors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| InjectError::InjectorNotFound(name.to_string()))
    }

    fn add<Args, C>(&self, injector: &str, tag: Option<&str>, ctor: C) -> Result<(), InjectError>
    where
        C: Constructor<Args>,
    {
        let injector = self.injector(injector)?;
        let build: Build = Box::new(move |resolver| Ok(Arc::new(ctor.construct(resolver)?) as Instance));
        injector.add_slot(Key::of::<C::Output>(tag), label::<C::Output>(tag), build)
    }

    /// Add a provider for `C::Output` to `injector`
    pub fn provide<Args, C>(&self, injector: &str, ctor: C) -> Result<(), InjectError>
    where
        C: Constructor<Args>,
    {
        self.add(injector, None, ctor)
    }

    /// Add a provider resolvable only under `tag`
    pub fn provide_tagged<Args, C>(&self, injector: &str, tag: &str, ctor: C) -> Result<(), InjectError>
    where
        C: Constructor<Args>,
    {
        self.add(injector, Some(tag), ctor)
    }

    /// Add a provider whose constructor can fail
    pub fn provide_fallible<Args, C, T>(&self, injector: &str, ctor: C) -> Result<(), InjectError>
    where
        C: Constructor<Args, Output = anyhow::Result<T>>,
        T: Send + Sync + 'static,
    {
        let injector = self.injector(injector)?;
        let owner = injector.name.clone();
        let build: Build = Box::new(move |resolver| {
            let value = ctor
                .construct(resolver)?
                .map_err(|source| InjectError::Provider {
                    injector: owner.clone(),
                    key: label::<T>(None),
                    source,
                })?;
            Ok(Arc::new(value) as Instance)
        });
        injector.add_slot(Key::of::<T>(None), label::<T>(None), build)
    }

    pub fn resolve<T: Clone + Send + Sync + 'static>(&self, injector: &str) -> Result<T, InjectError> {
        let injector = self.injector(injector)?;
        let mut stack = Vec::new();
        Resolver {
            injector: &injector,
            stack: &mut stack,
        }
        .resolve()
    }

    pub fn resolve_tagged<T: Clone + Send + Sync + 'static>(
        &self,
        injector: &str,
        tag: &str,
    ) -> Result<T, InjectError> {
        let injector = self.injector(injector)?;
        let mut stack = Vec::new();
        Resolver {
            injector: &injector,
            stack: &mut stack,
        }
        .resolve_tagged(tag)
    }

    /// Fill the dependencies of `target` from `injector`
    pub fn apply<C: Injectable + ?Sized>(&self, injector: &str, target: &mut C) -> Result<(), InjectError> {
        let injector = self.injector(injector)?;
        let mut stack = Vec::new();
        target.inject(&mut Resolver {
            injector: &injector,
            stack: &mut stack,
        })
    }

    /// Inject now and render later with `injector` recorded on the scope
    pub fn inject<C: Injectable + Render>(&self, injector: &str, mut component: C) -> Result<Injected<C>, InjectError> {
        self.apply(injector, &mut component)?;
        Ok(Injected {
            injector: injector.to_string(),
            component,
        })
    }
}
