//! # class-scan
//!
//! Finds Java classes on a classpath (class-output directories and jars) that
//! carry given annotations or extend a given supertype.
//!
//! ## Architecture
//!
//! - **package**: Package-name splitting and validation
//! - **classfile**: Class-file header parsing (names, supertypes, annotations)
//! - **classpath**: Class loader abstraction and the directory/jar `Classpath`
//! - **reflect**: Annotation and assignability queries over loaded classes
//! - **scan**: Predicates, result sets, directory walking and the scan entry points
//! - **probe**: Jar walking with direct-open and mounted-archive fallback
//! - **instantiate**: Default-constructor instantiation of scanned classes
//! - **cli** / **config**: Command-line front end and classpath resolution

pub mod classfile;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod instantiate;
pub mod package;
pub mod probe;
pub mod reflect;
pub mod scan;

#[cfg(test)]
mod testutil;
