use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::classfile::{ClassInfo, MemberInfo};
use crate::classpath::{ClassLoader, LoadedClass};

pub const OBJECT: &str = "java.lang.Object";
pub const INHERITED: &str = "java.lang.annotation.Inherited";

/// Whether `class` carries `annotation`, directly or through a superclass
/// when the annotation type is meta-annotated with `@Inherited`.
pub fn contains_annotation(loader: &dyn ClassLoader, class: &ClassInfo, annotation: &str) -> bool {
    if class.has_annotation(annotation) {
        return true;
    }
    if class.access.is_interface() {
        return false;
    }

    let inherited = loader
        .load_class(annotation)
        .is_some_and(|a| a.has_annotation(INHERITED));
    inherited
        && ancestors(loader, class)
            .iter()
            .any(|c| c.has_annotation(annotation))
}

pub fn contains_any_annotations<S: AsRef<str>>(
    loader: &dyn ClassLoader,
    class: &ClassInfo,
    annotations: &[S],
) -> bool {
    annotations
        .iter()
        .any(|a| contains_annotation(loader, class, a.as_ref()))
}

/// Whether a value of type `class` can be assigned to `supertype`.
///
/// Reflexive and transitive over superclasses and interfaces. Types missing
/// from the classpath end their branch but still match by name.
pub fn is_assignable_from(loader: &dyn ClassLoader, supertype: &str, class: &ClassInfo) -> bool {
    if class.name == supertype || supertype == OBJECT {
        return true;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = direct_supertypes(class).collect();

    while let Some(name) = queue.pop_front() {
        if name == supertype {
            return true;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(parent) = loader.load_class(&name) {
            queue.extend(direct_supertypes(&parent));
        }
    }

    false
}

fn direct_supertypes(class: &ClassInfo) -> impl Iterator<Item = String> + '_ {
    class
        .super_name
        .iter()
        .chain(class.interfaces.iter())
        .cloned()
}

/// Superclasses nearest first, stopping at the first one not on the classpath.
pub fn superclass_chain(
    loader: &dyn ClassLoader,
    class: &LoadedClass,
    include_self: bool,
) -> Vec<LoadedClass> {
    let mut chain = ancestors(loader, class);
    if include_self {
        chain.insert(0, Arc::clone(class));
    }
    chain
}

fn ancestors(loader: &dyn ClassLoader, class: &ClassInfo) -> Vec<LoadedClass> {
    let mut chain: Vec<LoadedClass> = Vec::new();
    let mut seen = HashSet::from([class.name.clone()]);
    let mut next = class.super_name.clone();

    while let Some(name) = next {
        if !seen.insert(name.clone()) {
            break;
        }
        let Some(parent) = loader.load_class(&name) else {
            break;
        };
        next = parent.super_name.clone();
        chain.push(parent);
    }

    chain
}

pub fn can_instantiate(class: &ClassInfo) -> bool {
    !class.access.is_abstract() && !class.access.is_interface() && class.has_default_constructor
}

/// A field or method with the class that declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredMember {
    pub declaring_class: String,
    pub member: MemberInfo,
}

impl DeclaredMember {
    fn new(owner: &ClassInfo, member: &MemberInfo) -> Self {
        Self {
            declaring_class: owner.name.clone(),
            member: member.clone(),
        }
    }
}

/// Non-static fields declared by `class` and its superclasses, nearest class
/// first. `field_type` is a Java type name (`int`, `java.lang.String[]`).
pub fn non_static_fields(
    loader: &dyn ClassLoader,
    class: &ClassInfo,
    field_type: Option<&str>,
) -> Vec<DeclaredMember> {
    let ancestors = ancestors(loader, class);
    std::iter::once(class)
        .chain(ancestors.iter().map(|c| &**c))
        .flat_map(|owner| {
            owner
                .fields
                .iter()
                .filter(|f| !f.access.is_static())
                .filter(move |f| field_type.is_none_or(|t| f.type_name() == t))
                .map(move |f| DeclaredMember::new(owner, f))
        })
        .collect()
}

pub fn all_non_static_fields(loader: &dyn ClassLoader, class: &ClassInfo) -> Vec<DeclaredMember> {
    non_static_fields(loader, class, None)
}

/// Finds a field of any visibility on `class`, then up its superclasses,
/// stopping before `java.lang.Object`.
pub fn find_declared_field(
    loader: &dyn ClassLoader,
    class: &ClassInfo,
    field_name: &str,
) -> Option<DeclaredMember> {
    if field_name.trim().is_empty() {
        return None;
    }
    let ancestors = ancestors(loader, class);
    std::iter::once(class)
        .chain(ancestors.iter().map(|c| &**c))
        .take_while(|owner| owner.name != OBJECT)
        .find_map(|owner| owner.field(field_name).map(|f| DeclaredMember::new(owner, f)))
}

/// Public methods of `class`, inherited ones included, that carry
/// `annotation` on their most specific declaration.
pub fn methods_with_annotation(
    loader: &dyn ClassLoader,
    class: &ClassInfo,
    annotation: &str,
) -> Vec<DeclaredMember> {
    let ancestors = ancestors(loader, class);
    let classes: Vec<&ClassInfo> = std::iter::once(class)
        .chain(ancestors.iter().map(|c| &**c))
        .collect();
    let interfaces = superinterfaces(loader, &classes);

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut found = Vec::new();
    for owner in classes.iter().copied().chain(interfaces.iter().map(|c| &**c)) {
        for method in &owner.methods {
            if !method.access.is_public() || method.is_constructor() {
                continue;
            }
            if !seen.insert((method.name.as_str(), method.descriptor.as_str())) {
                continue;
            }
            if method.has_annotation(annotation) {
                found.push(DeclaredMember::new(owner, method));
            }
        }
    }
    found
}

fn superinterfaces(loader: &dyn ClassLoader, classes: &[&ClassInfo]) -> Vec<LoadedClass> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = classes
        .iter()
        .flat_map(|c| c.interfaces.iter().cloned())
        .collect();
    let mut out = Vec::new();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(interface) = loader.load_class(&name) {
            queue.extend(interface.interfaces.iter().cloned());
            out.push(interface);
        }
    }
    out
}
