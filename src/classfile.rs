//! Class-file header parsing.
//!
//! Only what a classpath scan needs is kept: names, access flags, the direct
//! supertypes, runtime-visible annotations of the class and its members, and
//! the declared fields and methods. Code and other attributes are skipped.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CLASS_SUFFIX: &str = ".class";

const MAGIC: u32 = 0xCAFE_BABE;
const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

#[derive(Error, Debug)]
pub enum ClassFormatError {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unexpected end of class file at offset {0}")]
    Truncated(usize),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: u16 },

    #[error("constant pool index {0} does not reference the expected entry")]
    BadConstant(u16),

    #[error("unknown annotation element tag {0:?}")]
    UnknownElement(char),

    #[error("malformed modified UTF-8 in constant {0}")]
    BadUtf8(u16),
}

type ParseResult<T> = Result<T, ClassFormatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_annotation(self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    pub fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }
}

/// A declared field or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub annotations: Vec<String>,
}

impl MemberInfo {
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// Java type name of a field descriptor: `I` → `int`,
    /// `[Ljava/lang/String;` → `java.lang.String[]`.
    pub fn type_name(&self) -> String {
        descriptor_type_name(&self.descriptor)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub name: String,
    pub access: AccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub has_default_constructor: bool,
    pub major_version: u16,
    pub minor_version: u16,
    pub digest: String,
}

impl ClassInfo {
    pub fn parse(bytes: &[u8]) -> ParseResult<Self> {
        let mut r = Reader::new(bytes);

        let magic = r.u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = r.u2()?;
        let major_version = r.u2()?;

        let pool = ConstantPool::read(&mut r)?;

        let access = AccessFlags(r.u2()?);
        let name = pool.class_name(r.u2()?)?;
        let super_index = r.u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };

        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?);
        }

        let fields = read_members(&mut r, &pool)?;
        let methods = read_members(&mut r, &pool)?;
        let has_default_constructor = methods
            .iter()
            .any(|m| m.name == "<init>" && m.descriptor == "()V" && m.access.is_public());

        let annotations = read_annotated_attributes(&mut r, &pool)?;

        Ok(Self {
            name,
            access,
            super_name,
            interfaces,
            annotations,
            fields,
            methods,
            has_default_constructor,
            major_version,
            minor_version,
            digest: hash_bytes(bytes),
        })
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map_or(self.name.as_str(), |(_, s)| s)
    }

    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(p, _)| p)
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    pub fn field(&self, name: &str) -> Option<&MemberInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `a/b/C` → `a.b.C`
pub fn internal_to_dotted(name: &str) -> String {
    name.replace('/', ".")
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ClassFormatError::Truncated(self.pos))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.bytes(n).map(|_| ())
    }

    fn u1(&mut self) -> ParseResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u2(&mut self) -> ParseResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> ParseResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

enum Constant {
    Utf8(String),
    Class(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(r: &mut Reader<'_>) -> ParseResult<Self> {
        let count = u32::from(r.u2()?);
        // Index 0 is never valid.
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Other);

        let mut index = 1u32;
        while index < count {
            let slot = index as u16;
            let tag = r.u1()?;
            let entry = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    let text = decode_modified_utf8(r.bytes(len)?)
                        .ok_or(ClassFormatError::BadUtf8(slot))?;
                    Constant::Utf8(text)
                }
                7 => Constant::Class(r.u2()?),
                3 | 4 => {
                    r.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // Long and Double take this slot and the next one.
                    if index + 1 >= count {
                        return Err(ClassFormatError::BadConstant(slot));
                    }
                    r.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Other
                }
                8 | 16 | 19 | 20 => {
                    r.skip(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    r.skip(4)?;
                    Constant::Other
                }
                15 => {
                    r.skip(3)?;
                    Constant::Other
                }
                _ => return Err(ClassFormatError::UnknownTag { tag, index: slot }),
            };
            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn utf8(&self, index: u16) -> ParseResult<&str> {
        match self.entries.get(index as usize) {
            Some(Constant::Utf8(s)) => Ok(s),
            _ => Err(ClassFormatError::BadConstant(index)),
        }
    }

    fn class_name(&self, index: u16) -> ParseResult<String> {
        match self.entries.get(index as usize) {
            Some(Constant::Class(name_index)) => Ok(internal_to_dotted(self.utf8(*name_index)?)),
            _ => Err(ClassFormatError::BadConstant(index)),
        }
    }
}

fn read_members(r: &mut Reader<'_>, pool: &ConstantPool) -> ParseResult<Vec<MemberInfo>> {
    let count = r.u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = AccessFlags(r.u2()?);
        let name = pool.utf8(r.u2()?)?.to_string();
        let descriptor = pool.utf8(r.u2()?)?.to_string();
        let annotations = read_annotated_attributes(r, pool)?;
        members.push(MemberInfo {
            name,
            descriptor,
            access,
            annotations,
        });
    }
    Ok(members)
}

/// Reads an attribute table, keeping the types of its runtime-visible
/// annotations.
fn read_annotated_attributes(r: &mut Reader<'_>, pool: &ConstantPool) -> ParseResult<Vec<String>> {
    let mut annotations = Vec::new();
    let attribute_count = r.u2()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(r.u2()?)?;
        let len = r.u4()? as usize;
        let body = r.bytes(len)?;
        if attr_name == RUNTIME_VISIBLE_ANNOTATIONS {
            read_annotation_types(&mut Reader::new(body), pool, &mut annotations)?;
        }
    }
    Ok(annotations)
}

fn read_annotation_types(
    r: &mut Reader<'_>,
    pool: &ConstantPool,
    out: &mut Vec<String>,
) -> ParseResult<()> {
    let count = r.u2()?;
    for _ in 0..count {
        let descriptor = pool.utf8(r.u2()?)?;
        out.push(descriptor_to_class_name(descriptor));
        skip_element_pairs(r)?;
    }
    Ok(())
}

fn descriptor_to_class_name(descriptor: &str) -> String {
    let inner = descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor);
    internal_to_dotted(inner)
}

fn descriptor_type_name(descriptor: &str) -> String {
    let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
    let base = match &descriptor[dims..] {
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "D" => "double".to_string(),
        "F" => "float".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "S" => "short".to_string(),
        "Z" => "boolean".to_string(),
        "V" => "void".to_string(),
        other => descriptor_to_class_name(other),
    };
    format!("{base}{}", "[]".repeat(dims))
}

/// Decodes the JVM's modified UTF-8: `C0 80` for NUL and supplementary
/// characters as two encoded surrogates.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let continuation = |at: usize| {
            bytes
                .get(at)
                .filter(|c| *c & 0xC0 == 0x80)
                .map(|c| u16::from(c & 0x3F))
        };
        match b {
            0x01..=0x7F => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC0..=0xDF => {
                let c1 = continuation(i + 1)?;
                units.push((u16::from(b & 0x1F) << 6) | c1);
                i += 2;
            }
            0xE0..=0xEF => {
                let c1 = continuation(i + 1)?;
                let c2 = continuation(i + 2)?;
                units.push((u16::from(b & 0x0F) << 12) | (c1 << 6) | c2);
                i += 3;
            }
            _ => return None,
        }
    }
    Some(String::from_utf16_lossy(&units))
}

fn skip_element_pairs(r: &mut Reader<'_>) -> ParseResult<()> {
    let pairs = r.u2()?;
    for _ in 0..pairs {
        r.skip(2)?;
        skip_element_value(r)?;
    }
    Ok(())
}

fn skip_element_value(r: &mut Reader<'_>) -> ParseResult<()> {
    let tag = r.u1()? as char;
    match tag {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 's' | 'c' => r.skip(2),
        'e' => r.skip(4),
        '@' => {
            r.skip(2)?;
            skip_element_pairs(r)
        }
        '[' => {
            let n = r.u2()?;
            for _ in 0..n {
                skip_element_value(r)?;
            }
            Ok(())
        }
        other => Err(ClassFormatError::UnknownElement(other)),
    }
}
