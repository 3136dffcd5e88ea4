//! Fixture helpers shared by unit tests and `tests/`: a minimal class-file
//! assembler plus temp-dir and jar writers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use zip::ZipWriter;
use zip::write::FileOptions;

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "class_scan_test_{}_{}_{}_{}",
        std::process::id(),
        nanos,
        n,
        prefix
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub enum Element {
    Str(&'static str),
    Int(i32),
    Enum(&'static str, &'static str),
    Array(Vec<Element>),
    Nested(&'static str),
}

pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: u16,
    constructor_access: Option<u16>,
    annotations: Vec<(String, Vec<(&'static str, Element)>)>,
    fields: Vec<(u16, String, String)>,
    methods: Vec<(String, Vec<String>)>,
    long_constant: bool,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            access: 0x0001 | 0x0020,
            constructor_access: Some(0x0001),
            annotations: Vec::new(),
            fields: vec![(0x0002, "id".to_string(), "I".to_string())],
            methods: vec![("run".to_string(), Vec::new())],
            long_constant: false,
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn no_super(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn interface(mut self) -> Self {
        self.access = 0x0001 | 0x0200 | 0x0400;
        self.constructor_access = None;
        self
    }

    pub fn annotation_type(mut self) -> Self {
        self.access = 0x0001 | 0x0200 | 0x0400 | 0x2000;
        self.constructor_access = None;
        self.interfaces = vec!["java.lang.annotation.Annotation".to_string()];
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.access |= 0x0400;
        self
    }

    pub fn private_constructor(mut self) -> Self {
        self.constructor_access = Some(0x0002);
        self
    }

    pub fn annotated(mut self, annotation: &str) -> Self {
        self.annotations.push((annotation.to_string(), Vec::new()));
        self
    }

    pub fn annotated_with(mut self, annotation: &str, pairs: Vec<(&'static str, Element)>) -> Self {
        self.annotations.push((annotation.to_string(), pairs));
        self
    }

    /// Adds a private instance field.
    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((0x0002, name.to_string(), descriptor.to_string()));
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields
            .push((0x0002 | 0x0008, name.to_string(), descriptor.to_string()));
        self
    }

    pub fn no_fields(mut self) -> Self {
        self.fields.clear();
        self
    }

    /// Adds a public `()V` method carrying `annotations`.
    pub fn method(mut self, name: &str, annotations: &[&str]) -> Self {
        self.methods.push((
            name.to_string(),
            annotations.iter().map(|a| a.to_string()).collect(),
        ));
        self
    }

    pub fn with_long_constant(mut self) -> Self {
        self.long_constant = true;
        self
    }

    pub fn entry_name(&self) -> String {
        format!("{}.class", self.name.replace('.', "/"))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::new();
        let mut body = Vec::new();

        if self.long_constant {
            pool.long(42);
        }

        put_u2(&mut body, self.access);
        let this = pool.class(&self.name);
        put_u2(&mut body, this);
        let super_index = self.super_name.as_deref().map_or(0, |s| pool.class(s));
        put_u2(&mut body, super_index);

        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            let idx = pool.class(interface);
            put_u2(&mut body, idx);
        }

        put_u2(&mut body, self.fields.len() as u16);
        for (access, name, type_descriptor) in &self.fields {
            put_u2(&mut body, *access);
            put_u2(&mut body, pool.utf8(name));
            put_u2(&mut body, pool.utf8(type_descriptor));
            put_u2(&mut body, 0);
        }

        let no_annotations: Vec<String> = Vec::new();
        let mut methods: Vec<(u16, &str, &str, &Vec<String>)> = self
            .methods
            .iter()
            .map(|(name, annotations)| (0x0001, name.as_str(), "()V", annotations))
            .collect();
        if let Some(access) = self.constructor_access {
            methods.push((access, "<init>", "()V", &no_annotations));
        }
        methods.push((0x0001, "<init>", "(Ljava/lang/String;)V", &no_annotations));
        put_u2(&mut body, methods.len() as u16);
        for (access, name, method_descriptor, annotations) in methods {
            put_u2(&mut body, access);
            put_u2(&mut body, pool.utf8(name));
            put_u2(&mut body, pool.utf8(method_descriptor));
            put_u2(&mut body, if annotations.is_empty() { 1 } else { 2 });
            put_u2(&mut body, pool.utf8("Code"));
            put_u4(&mut body, 3);
            body.extend_from_slice(&[0x2a, 0xb1, 0x00]);
            if !annotations.is_empty() {
                let mut attr = Vec::new();
                put_u2(&mut attr, annotations.len() as u16);
                for annotation in annotations {
                    put_u2(&mut attr, pool.utf8(&descriptor(annotation)));
                    put_u2(&mut attr, 0);
                }
                put_u2(&mut body, pool.utf8("RuntimeVisibleAnnotations"));
                put_u4(&mut body, attr.len() as u32);
                body.extend_from_slice(&attr);
            }
        }

        // attributes
        let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
        let source_file = pool.utf8("Fixture.java");
        attributes.push((pool.utf8("SourceFile"), source_file.to_be_bytes().to_vec()));
        if !self.annotations.is_empty() {
            let mut attr = Vec::new();
            put_u2(&mut attr, self.annotations.len() as u16);
            for (annotation, pairs) in &self.annotations {
                put_u2(&mut attr, pool.utf8(&descriptor(annotation)));
                put_u2(&mut attr, pairs.len() as u16);
                for (key, value) in pairs {
                    put_u2(&mut attr, pool.utf8(key));
                    encode_element(&mut attr, &mut pool, value);
                }
            }
            attributes.push((pool.utf8("RuntimeVisibleAnnotations"), attr));
        }
        put_u2(&mut body, attributes.len() as u16);
        for (name, data) in attributes {
            put_u2(&mut body, name);
            put_u4(&mut body, data.len() as u32);
            body.extend_from_slice(&data);
        }

        let mut out = Vec::new();
        put_u4(&mut out, 0xCAFE_BABE);
        put_u2(&mut out, 0);
        put_u2(&mut out, 52);
        put_u2(&mut out, pool.count);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }

    /// Writes the class file under `root` following its package layout.
    pub fn write_to(&self, root: &Path) -> PathBuf {
        let path = root.join(self.entry_name());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn descriptor(name: &str) -> String {
    format!("L{};", name.replace('.', "/"))
}

fn encode_element(out: &mut Vec<u8>, pool: &mut Pool, value: &Element) {
    match value {
        Element::Str(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        Element::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.integer(*v));
        }
        Element::Enum(ty, constant) => {
            out.push(b'e');
            put_u2(out, pool.utf8(&descriptor(ty)));
            put_u2(out, pool.utf8(constant));
        }
        Element::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for v in values {
                encode_element(out, pool, v);
            }
        }
        Element::Nested(ty) => {
            out.push(b'@');
            put_u2(out, pool.utf8(&descriptor(ty)));
            put_u2(out, 0);
        }
    }
}

struct Pool {
    bytes: Vec<u8>,
    count: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            count: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(idx) = self.utf8s.get(s) {
            return *idx;
        }
        let idx = self.count;
        let encoded = modified_utf8(s);
        self.bytes.push(1);
        put_u2(&mut self.bytes, encoded.len() as u16);
        self.bytes.extend_from_slice(&encoded);
        self.count += 1;
        self.utf8s.insert(s.to_string(), idx);
        idx
    }

    fn class(&mut self, dotted: &str) -> u16 {
        if let Some(idx) = self.classes.get(dotted) {
            return *idx;
        }
        let name = self.utf8(&dotted.replace('.', "/"));
        let idx = self.count;
        self.bytes.push(7);
        put_u2(&mut self.bytes, name);
        self.count += 1;
        self.classes.insert(dotted.to_string(), idx);
        idx
    }

    fn integer(&mut self, v: i32) -> u16 {
        let idx = self.count;
        self.bytes.push(3);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self.count += 1;
        idx
    }

    fn long(&mut self, v: i64) -> u16 {
        let idx = self.count;
        self.bytes.push(5);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self.count += 2;
        idx
    }
}

/// Class-file string encoding: NUL as `C0 80`, non-BMP characters as two
/// three-byte surrogates.
pub fn modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        if c != '\0' && c.is_ascii() {
            out.push(c as u8);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units).iter().copied() {
            if unit < 0x800 {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            } else {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn jar_bytes(classes: &[ClassBuilder], extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
    zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
    for class in classes {
        zip.start_file(class.entry_name(), options).unwrap();
        zip.write_all(&class.build()).unwrap();
    }
    for (name, content) in extra {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_jar(path: &Path, classes: &[ClassBuilder], extra: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, jar_bytes(classes, extra)).unwrap();
}
