//! Protobuf canonicalization
//!
//! Parses `.proto` text into a descriptor model (messages, fields with
//! explicit numbers and types, nested types, enums, maps, oneofs, reserved
//! ranges) and re-serializes it in a canonical textual form ordered by
//! declaration. Comments, incidental whitespace, and field options are
//! stripped, so formatting differences collapse to identity.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::error::{RegistryError, Result};

/// Largest legal field number, 2^29 - 1.
const MAX_FIELD_NUMBER: i64 = 536_870_911;

/// Canonicalize Protobuf schema text.
pub fn canonicalize(raw: &str) -> Result<String> {
    Ok(parse(raw)?.render())
}

/// Parse `.proto` text into a descriptor model.
pub fn parse(raw: &str) -> Result<ProtoFile> {
    let tokens = tokenize(raw)?;
    Parser::new(tokens).parse_file()
}

/// Protobuf syntax edition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

/// Parsed `.proto` file
#[derive(Debug, Clone)]
pub struct ProtoFile {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub messages: Vec<MessageDescriptor>,
    pub enums: Vec<EnumDescriptor>,
}

/// A message definition
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
    pub nested: Vec<MessageDescriptor>,
    pub enums: Vec<EnumDescriptor>,
    /// Reserved field number ranges, inclusive
    pub reserved_numbers: Vec<(u32, u32)>,
    pub reserved_names: Vec<String>,
}

/// A oneof group inside a message
#[derive(Debug, Clone)]
pub struct OneofDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

/// A single field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub label: FieldLabel,
    pub field_type: FieldType,
    pub name: String,
    pub number: u32,
}

/// Field cardinality label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLabel {
    Singular,
    Optional,
    Required,
    Repeated,
}

/// Field type, with named (message or enum) types left unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    /// Message or enum type, by (possibly qualified) name
    Named(String),
    Map(Box<FieldType>, Box<FieldType>),
}

/// An enum definition
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<(String, i64)>,
}

impl MessageDescriptor {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested: Vec::new(),
            enums: Vec::new(),
            reserved_numbers: Vec::new(),
            reserved_names: Vec::new(),
        }
    }

    /// All fields, including those declared inside oneof groups.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .chain(self.oneofs.iter().flat_map(|o| o.fields.iter()))
    }

    /// Whether a field number falls in a reserved range.
    pub fn is_number_reserved(&self, number: u32) -> bool {
        self.reserved_numbers
            .iter()
            .any(|(lo, hi)| (*lo..=*hi).contains(&number))
    }
}

impl ProtoFile {
    /// Collect qualified names of all enums, e.g. `Outer.Status`.
    /// Used to distinguish enum-typed fields (varint) from message-typed
    /// fields (length-delimited) when comparing wire types.
    pub fn enum_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for e in &self.enums {
            names.insert(e.name.clone());
        }
        fn walk(prefix: &str, message: &MessageDescriptor, names: &mut HashSet<String>) {
            let path = if prefix.is_empty() {
                message.name.clone()
            } else {
                format!("{}.{}", prefix, message.name)
            };
            for e in &message.enums {
                names.insert(format!("{}.{}", path, e.name));
                names.insert(e.name.clone());
            }
            for nested in &message.nested {
                walk(&path, nested, names);
            }
        }
        for message in &self.messages {
            walk("", message, &mut names);
        }
        names
    }

    /// Render the canonical textual form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let syntax = match self.syntax {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        };
        let _ = writeln!(out, "syntax = \"{}\";", syntax);
        if let Some(package) = &self.package {
            let _ = writeln!(out, "package {};", package);
        }
        for import in &self.imports {
            let _ = writeln!(out, "import \"{}\";", import);
        }
        for message in &self.messages {
            render_message(&mut out, message, 0);
        }
        for e in &self.enums {
            render_enum(&mut out, e, 0);
        }
        out
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn render_message(out: &mut String, message: &MessageDescriptor, depth: usize) {
    indent(out, depth);
    let _ = writeln!(out, "message {} {{", message.name);
    for field in &message.fields {
        render_field(out, field, depth + 1);
    }
    for oneof in &message.oneofs {
        indent(out, depth + 1);
        let _ = writeln!(out, "oneof {} {{", oneof.name);
        for field in &oneof.fields {
            render_field(out, field, depth + 2);
        }
        indent(out, depth + 1);
        out.push_str("}\n");
    }
    if !message.reserved_numbers.is_empty() {
        indent(out, depth + 1);
        let ranges: Vec<String> = message
            .reserved_numbers
            .iter()
            .map(|(lo, hi)| {
                if lo == hi {
                    lo.to_string()
                } else if i64::from(*hi) == MAX_FIELD_NUMBER {
                    format!("{} to max", lo)
                } else {
                    format!("{} to {}", lo, hi)
                }
            })
            .collect();
        let _ = writeln!(out, "reserved {};", ranges.join(", "));
    }
    if !message.reserved_names.is_empty() {
        indent(out, depth + 1);
        let names: Vec<String> = message
            .reserved_names
            .iter()
            .map(|n| format!("\"{}\"", n))
            .collect();
        let _ = writeln!(out, "reserved {};", names.join(", "));
    }
    for nested in &message.nested {
        render_message(out, nested, depth + 1);
    }
    for e in &message.enums {
        render_enum(out, e, depth + 1);
    }
    indent(out, depth);
    out.push_str("}\n");
}

fn render_field(out: &mut String, field: &FieldDescriptor, depth: usize) {
    indent(out, depth);
    let label = match field.label {
        FieldLabel::Singular => "",
        FieldLabel::Optional => "optional ",
        FieldLabel::Required => "required ",
        FieldLabel::Repeated => "repeated ",
    };
    let _ = writeln!(
        out,
        "{}{} {} = {};",
        label,
        field.field_type.render(),
        field.name,
        field.number
    );
}

fn render_enum(out: &mut String, e: &EnumDescriptor, depth: usize) {
    indent(out, depth);
    let _ = writeln!(out, "enum {} {{", e.name);
    for (name, number) in &e.values {
        indent(out, depth + 1);
        let _ = writeln!(out, "{} = {};", name, number);
    }
    indent(out, depth);
    out.push_str("}\n");
}

impl FieldType {
    pub fn render(&self) -> String {
        match self {
            FieldType::Double => "double".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Int32 => "int32".to_string(),
            FieldType::Int64 => "int64".to_string(),
            FieldType::Uint32 => "uint32".to_string(),
            FieldType::Uint64 => "uint64".to_string(),
            FieldType::Sint32 => "sint32".to_string(),
            FieldType::Sint64 => "sint64".to_string(),
            FieldType::Fixed32 => "fixed32".to_string(),
            FieldType::Fixed64 => "fixed64".to_string(),
            FieldType::Sfixed32 => "sfixed32".to_string(),
            FieldType::Sfixed64 => "sfixed64".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::String => "string".to_string(),
            FieldType::Bytes => "bytes".to_string(),
            FieldType::Named(name) => name.clone(),
            FieldType::Map(key, value) => {
                format!("map<{}, {}>", key.render(), value.render())
            }
        }
    }

    fn from_name(name: &str) -> FieldType {
        match name {
            "double" => FieldType::Double,
            "float" => FieldType::Float,
            "int32" => FieldType::Int32,
            "int64" => FieldType::Int64,
            "uint32" => FieldType::Uint32,
            "uint64" => FieldType::Uint64,
            "sint32" => FieldType::Sint32,
            "sint64" => FieldType::Sint64,
            "fixed32" => FieldType::Fixed32,
            "fixed64" => FieldType::Fixed64,
            "sfixed32" => FieldType::Sfixed32,
            "sfixed64" => FieldType::Sfixed64,
            "bool" => FieldType::Bool,
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            other => FieldType::Named(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Punct(char),
}

fn tokenize(raw: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some('/') => {
                        // Line comment
                        for c in chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        let mut closed = false;
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                closed = true;
                                break;
                            }
                            prev = c;
                        }
                        if !closed {
                            return Err(proto_error("unterminated block comment"));
                        }
                    }
                    _ => return Err(proto_error("unexpected '/'")),
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push('\\');
                            value.push(escaped);
                            continue;
                        }
                        return Err(proto_error("unterminated escape sequence"));
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(proto_error("unterminated string literal"));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Only integer literals matter for descriptors; floats show
                // up solely inside option values, which are skipped.
                match literal.parse::<i64>() {
                    Ok(value) => tokens.push(Token::Int(value)),
                    Err(_) => tokens.push(Token::Ident(literal)),
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '{' | '}' | '(' | ')' | '[' | ']' | '<' | '>' | '=' | ';' | ',' | '-' => {
                tokens.push(Token::Punct(c));
                chars.next();
            }
            other => {
                return Err(proto_error(&format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn proto_error(message: &str) -> RegistryError {
    RegistryError::Parse {
        schema_type: "PROTOBUF",
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| proto_error("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect_punct(&mut self, expected: char) -> Result<()> {
        match self.next()? {
            Token::Punct(c) if c == expected => Ok(()),
            other => Err(proto_error(&format!(
                "expected '{}', found {:?}",
                expected, other
            ))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(proto_error(&format!("expected identifier, found {:?}", other))),
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        match self.next()? {
            Token::Int(value) => Ok(value),
            Token::Punct('-') => match self.next()? {
                Token::Int(value) => Ok(-value),
                other => Err(proto_error(&format!("expected integer, found {:?}", other))),
            },
            other => Err(proto_error(&format!("expected integer, found {:?}", other))),
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_file(&mut self) -> Result<ProtoFile> {
        let mut file = ProtoFile {
            syntax: Syntax::Proto2,
            package: None,
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
        };

        while let Some(token) = self.peek() {
            match token {
                Token::Punct(';') => {
                    self.pos += 1;
                }
                Token::Ident(keyword) => {
                    let keyword = keyword.clone();
                    match keyword.as_str() {
                        "syntax" => {
                            self.pos += 1;
                            self.expect_punct('=')?;
                            let value = match self.next()? {
                                Token::Str(s) => s,
                                other => {
                                    return Err(proto_error(&format!(
                                        "expected syntax string, found {:?}",
                                        other
                                    )))
                                }
                            };
                            file.syntax = match value.as_str() {
                                "proto2" => Syntax::Proto2,
                                "proto3" => Syntax::Proto3,
                                other => {
                                    return Err(proto_error(&format!(
                                        "unsupported syntax \"{}\"",
                                        other
                                    )))
                                }
                            };
                            self.expect_punct(';')?;
                        }
                        "package" => {
                            self.pos += 1;
                            file.package = Some(self.expect_ident()?);
                            self.expect_punct(';')?;
                        }
                        "import" => {
                            self.pos += 1;
                            // Skip the optional "public" / "weak" modifier
                            if let Some(Token::Ident(modifier)) = self.peek() {
                                if modifier == "public" || modifier == "weak" {
                                    self.pos += 1;
                                }
                            }
                            match self.next()? {
                                Token::Str(path) => file.imports.push(path),
                                other => {
                                    return Err(proto_error(&format!(
                                        "expected import path, found {:?}",
                                        other
                                    )))
                                }
                            }
                            self.expect_punct(';')?;
                        }
                        "option" => {
                            self.pos += 1;
                            self.skip_option()?;
                        }
                        "message" => {
                            self.pos += 1;
                            file.messages.push(self.parse_message()?);
                        }
                        "enum" => {
                            self.pos += 1;
                            file.enums.push(self.parse_enum()?);
                        }
                        other => {
                            return Err(proto_error(&format!(
                                "unexpected top-level keyword '{}'",
                                other
                            )))
                        }
                    }
                }
                other => {
                    return Err(proto_error(&format!("unexpected token {:?}", other)));
                }
            }
        }

        Ok(file)
    }

    fn parse_message(&mut self) -> Result<MessageDescriptor> {
        let name = self.expect_ident()?;
        let mut message = MessageDescriptor::new(name);
        self.expect_punct('{')?;

        loop {
            match self.peek() {
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                }
                Some(Token::Ident(keyword)) => {
                    let keyword = keyword.clone();
                    match keyword.as_str() {
                        "message" => {
                            self.pos += 1;
                            message.nested.push(self.parse_message()?);
                        }
                        "enum" => {
                            self.pos += 1;
                            message.enums.push(self.parse_enum()?);
                        }
                        "oneof" => {
                            self.pos += 1;
                            message.oneofs.push(self.parse_oneof()?);
                        }
                        "reserved" => {
                            self.pos += 1;
                            self.parse_reserved(&mut message)?;
                        }
                        "option" => {
                            self.pos += 1;
                            self.skip_option()?;
                        }
                        _ => {
                            let field = self.parse_field(true)?;
                            message.fields.push(field);
                        }
                    }
                }
                Some(other) => {
                    return Err(proto_error(&format!(
                        "unexpected token in message body: {:?}",
                        other
                    )));
                }
                None => return Err(proto_error("unterminated message body")),
            }
        }

        Ok(message)
    }

    fn parse_field(&mut self, allow_label: bool) -> Result<FieldDescriptor> {
        let mut label = FieldLabel::Singular;
        let mut type_name = self.expect_ident()?;

        if allow_label {
            match type_name.as_str() {
                "optional" => {
                    label = FieldLabel::Optional;
                    type_name = self.expect_ident()?;
                }
                "required" => {
                    label = FieldLabel::Required;
                    type_name = self.expect_ident()?;
                }
                "repeated" => {
                    label = FieldLabel::Repeated;
                    type_name = self.expect_ident()?;
                }
                _ => {}
            }
        }

        let field_type = if type_name == "map" && self.peek() == Some(&Token::Punct('<')) {
            self.pos += 1;
            let key = FieldType::from_name(&self.expect_ident()?);
            self.expect_punct(',')?;
            let value = FieldType::from_name(&self.expect_ident()?);
            self.expect_punct('>')?;
            FieldType::Map(Box::new(key), Box::new(value))
        } else {
            FieldType::from_name(&type_name)
        };

        let name = self.expect_ident()?;
        self.expect_punct('=')?;
        let number = self.expect_int()?;
        if number <= 0 || number > MAX_FIELD_NUMBER {
            return Err(proto_error(&format!(
                "field '{}' has out-of-range number {}",
                name, number
            )));
        }

        // Field options are not part of the canonical descriptor
        if self.eat_punct('[') {
            self.skip_until_balanced('[', ']')?;
        }
        self.expect_punct(';')?;

        Ok(FieldDescriptor {
            label,
            field_type,
            name,
            number: number as u32,
        })
    }

    fn parse_oneof(&mut self) -> Result<OneofDescriptor> {
        let name = self.expect_ident()?;
        let mut oneof = OneofDescriptor {
            name,
            fields: Vec::new(),
        };
        self.expect_punct('{')?;
        loop {
            match self.peek() {
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                }
                Some(Token::Ident(keyword)) if keyword == "option" => {
                    self.pos += 1;
                    self.skip_option()?;
                }
                Some(Token::Ident(_)) => {
                    oneof.fields.push(self.parse_field(false)?);
                }
                Some(other) => {
                    return Err(proto_error(&format!(
                        "unexpected token in oneof body: {:?}",
                        other
                    )));
                }
                None => return Err(proto_error("unterminated oneof body")),
            }
        }
        Ok(oneof)
    }

    fn parse_reserved(&mut self, message: &mut MessageDescriptor) -> Result<()> {
        match self.peek() {
            Some(Token::Str(_)) => loop {
                match self.next()? {
                    Token::Str(name) => message.reserved_names.push(name),
                    other => {
                        return Err(proto_error(&format!(
                            "expected reserved name, found {:?}",
                            other
                        )))
                    }
                }
                if !self.eat_punct(',') {
                    break;
                }
            },
            _ => loop {
                let lo = self.expect_int()?;
                if lo <= 0 || lo > MAX_FIELD_NUMBER {
                    return Err(proto_error(&format!(
                        "reserved field number {} out of range",
                        lo
                    )));
                }
                let mut hi = lo as u32;
                if let Some(Token::Ident(kw)) = self.peek() {
                    if kw == "to" {
                        self.pos += 1;
                        hi = match self.peek() {
                            Some(Token::Ident(kw)) if kw == "max" => {
                                self.pos += 1;
                                MAX_FIELD_NUMBER as u32
                            }
                            _ => {
                                let end = self.expect_int()?;
                                if end < lo || end > MAX_FIELD_NUMBER {
                                    return Err(proto_error(&format!(
                                        "reserved range {} to {} is invalid",
                                        lo, end
                                    )));
                                }
                                end as u32
                            }
                        };
                    }
                }
                message.reserved_numbers.push((lo as u32, hi));
                if !self.eat_punct(',') {
                    break;
                }
            },
        }
        self.expect_punct(';')?;
        Ok(())
    }

    fn parse_enum(&mut self) -> Result<EnumDescriptor> {
        let name = self.expect_ident()?;
        let mut descriptor = EnumDescriptor {
            name,
            values: Vec::new(),
        };
        self.expect_punct('{')?;
        loop {
            match self.peek() {
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                }
                Some(Token::Ident(keyword)) if keyword == "option" => {
                    self.pos += 1;
                    self.skip_option()?;
                }
                Some(Token::Ident(keyword)) if keyword == "reserved" => {
                    self.pos += 1;
                    // Enum reserved statements do not affect the descriptor
                    // comparison rules; skip to the terminating semicolon.
                    while self.peek() != Some(&Token::Punct(';')) {
                        self.next()?;
                    }
                    self.pos += 1;
                }
                Some(Token::Ident(_)) => {
                    let value_name = self.expect_ident()?;
                    self.expect_punct('=')?;
                    let number = self.expect_int()?;
                    if self.eat_punct('[') {
                        self.skip_until_balanced('[', ']')?;
                    }
                    self.expect_punct(';')?;
                    descriptor.values.push((value_name, number));
                }
                Some(other) => {
                    return Err(proto_error(&format!(
                        "unexpected token in enum body: {:?}",
                        other
                    )));
                }
                None => return Err(proto_error("unterminated enum body")),
            }
        }
        Ok(descriptor)
    }

    /// Skip an option statement's value, including aggregate `{...}` values.
    fn skip_option(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| proto_error("unbalanced option value"))?;
                }
                Token::Punct(';') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    /// Skip tokens until the bracket opened just before this call closes.
    fn skip_until_balanced(&mut self, open: char, close: char) -> Result<()> {
        let mut depth = 1usize;
        loop {
            match self.next()? {
                Token::Punct(c) if c == open => depth += 1,
                Token::Punct(c) if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }
}
