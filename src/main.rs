use anyhow::Result;
use clap::Parser;
use class_scan::classfile::ClassInfo;
use class_scan::classpath::{ClassLoader, Classpath};
use class_scan::cli::{Cli, Commands, OutputFormat};
use class_scan::config::resolve_classpath;
use class_scan::package::extract_packages;
use class_scan::reflect::superclass_chain;
use class_scan::scan::{AnnotatedWithAny, ClassSet, scan_by_supertype, scan_generic};
use serde::Serialize;
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command.clone() {
        Commands::Scan {
            packages,
            annotations,
            supertype,
            no_recurse,
        } => {
            let classpath = resolve_classpath(&cli)?;
            let report = run_scan(&classpath, &packages, &annotations, supertype, !no_recurse)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    for class in &report.classes {
                        println!("{}", class.name);
                    }
                }
            }
        }
        Commands::Packages { input } => {
            let packages = extract_packages(&input);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&packages)?),
                OutputFormat::Text => {
                    for package in packages {
                        println!("{package}");
                    }
                }
            }
        }
        Commands::Inspect {
            class_name,
            superclasses,
        } => {
            let classpath = resolve_classpath(&cli)?;
            let class = classpath.load_class(class_name.trim()).ok_or_else(|| {
                anyhow::anyhow!("class {class_name} not found on classpath {classpath:?}")
            })?;
            let chain = superclasses.then(|| {
                superclass_chain(&classpath, &class, false)
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>()
            });
            match cli.format {
                OutputFormat::Json => {
                    let report = InspectReport {
                        class: &class,
                        superclasses: chain,
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text => {
                    print!("{}", describe(&class));
                    for name in chain.unwrap_or_default() {
                        println!("superclass: {name}");
                    }
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ClassSummary {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<String>,
    is_interface: bool,
    is_abstract: bool,
    digest: String,
}

impl From<&ClassInfo> for ClassSummary {
    fn from(class: &ClassInfo) -> Self {
        Self {
            name: class.name.clone(),
            super_name: class.super_name.clone(),
            interfaces: class.interfaces.clone(),
            annotations: class.annotations.clone(),
            is_interface: class.access.is_interface(),
            is_abstract: class.access.is_abstract(),
            digest: class.digest.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScanReport {
    packages: Vec<String>,
    recurse: bool,
    matched: usize,
    duration_ms: u64,
    classes: Vec<ClassSummary>,
}

#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    class: &'a ClassInfo,
    superclasses: Option<Vec<String>>,
}

fn run_scan(
    classpath: &Classpath,
    packages: &[String],
    annotations: &[String],
    supertype: Option<String>,
    recurse: bool,
) -> Result<ScanReport> {
    let start = Instant::now();

    let classes: ClassSet = if annotations.is_empty() {
        scan_by_supertype(classpath, supertype.as_deref(), recurse, packages)?
    } else {
        let accept = AnnotatedWithAny::new(classpath, annotations);
        scan_generic(classpath, recurse, packages, Some(&accept))?
    };

    Ok(ScanReport {
        packages: extract_packages(packages).into_iter().collect(),
        recurse,
        matched: classes.len(),
        duration_ms: start.elapsed().as_millis() as u64,
        classes: classes.iter().map(|c| ClassSummary::from(&**c)).collect(),
    })
}

fn describe(class: &ClassInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("name: {}\n", class.name));
    out.push_str(&format!("access: {:#06x}\n", class.access.0));
    if let Some(super_name) = &class.super_name {
        out.push_str(&format!("extends: {super_name}\n"));
    }
    for interface in &class.interfaces {
        out.push_str(&format!("implements: {interface}\n"));
    }
    for annotation in &class.annotations {
        out.push_str(&format!("annotation: {annotation}\n"));
    }
    for field in &class.fields {
        out.push_str(&format!("field: {} {}\n", field.type_name(), field.name));
    }
    for method in class.methods.iter().filter(|m| !m.annotations.is_empty()) {
        out.push_str(&format!(
            "method: {}{} @{}\n",
            method.name,
            method.descriptor,
            method.annotations.join(" @")
        ));
    }
    out.push_str(&format!(
        "default_constructor: {}\n",
        class.has_default_constructor
    ));
    out.push_str(&format!(
        "version: {}.{}\n",
        class.major_version, class.minor_version
    ));
    out
}
