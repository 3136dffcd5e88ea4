//! Instantiation of scanned classes through registered default constructors.
//!
//! A class is only constructed when it is assignable to the requested
//! supertype, concrete, and declares a public no-arg constructor. The Rust
//! value for it comes from the constructor registered under its name.

use anyhow::{Context, Result, bail};
use std::collections::{HashMap, HashSet};

use crate::classfile::ClassInfo;
use crate::classpath::ClassLoader;
use crate::package::split_names;
use crate::reflect::is_assignable_from;
use crate::scan::scan_by_supertype;

type Constructor<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

pub struct InstanceRegistry<T> {
    constructors: HashMap<String, Constructor<T>>,
}

impl<T> Default for InstanceRegistry<T> {
    fn default() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }
}

impl<T> InstanceRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class_name: &str, constructor: F) -> &mut Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        self.constructors
            .insert(class_name.to_string(), Box::new(constructor));
        self
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    /// `Ok(None)` for classes that are not assignable to `supertype` or are
    /// abstract. Missing constructors and construction failures are errors.
    pub fn new_instance(
        &self,
        loader: &dyn ClassLoader,
        supertype: &str,
        class: &ClassInfo,
    ) -> Result<Option<T>> {
        if !is_assignable_from(loader, supertype, class) {
            return Ok(None);
        }
        if class.access.is_abstract() || class.access.is_interface() {
            return Ok(None);
        }
        if !class.has_default_constructor {
            bail!("class [{}] has no public no-arg constructor", class.name);
        }

        let Some(constructor) = self.constructors.get(&class.name) else {
            bail!("no constructor registered for class [{}]", class.name);
        };
        let instance =
            constructor().with_context(|| format!("failed to instantiate class [{}]", class.name))?;
        Ok(Some(instance))
    }

    /// Loads `class_name` and instantiates it; failures are logged and give `None`.
    pub fn new_instance_by_name(
        &self,
        loader: &dyn ClassLoader,
        supertype: &str,
        class_name: &str,
    ) -> Option<T> {
        let result = loader
            .load_class(class_name)
            .with_context(|| format!("class [{class_name}] not found"))
            .and_then(|class| self.new_instance(loader, supertype, &class));

        match result {
            Ok(instance) => instance,
            Err(err) => {
                log::warn!("failed to instantiate class [{class_name}]: {err:#}");
                None
            }
        }
    }

    /// Instantiates every class of a separated name list, skipping failures.
    pub fn new_instances(
        &self,
        loader: &dyn ClassLoader,
        supertype: &str,
        class_names: &str,
    ) -> Vec<T> {
        split_names(class_names)
            .iter()
            .filter_map(|name| self.new_instance_by_name(loader, supertype, name))
            .collect()
    }

    /// Scans `packages` (sub-packages included) for classes assignable to
    /// `supertype` and instantiates each of them. Repeated package names are
    /// scanned once. The first failure aborts.
    pub fn scan_and_instantiate(
        &self,
        loader: &dyn ClassLoader,
        supertype: &str,
        packages: &str,
    ) -> Result<Vec<T>> {
        let mut seen = HashSet::new();
        let mut instances = Vec::new();
        for package in split_names(packages) {
            if !seen.insert(package.clone()) {
                continue;
            }
            let classes = scan_by_supertype(loader, Some(supertype), true, &[package.as_str()])?;
            for class in classes.iter() {
                if let Some(instance) = self.new_instance(loader, supertype, class)? {
                    instances.push(instance);
                }
            }
        }
        Ok(instances)
    }
}
