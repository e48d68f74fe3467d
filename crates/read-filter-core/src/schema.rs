//! Schema text: declarations of column types, tables, and databases.
//!
//! A schema is stored verbatim in an object's `schema` metadata node; the
//! node's `name` attribute names the declared table or database type the
//! object instantiates.
//!
//! ```text
//! version 1;
//! typedef U8 INSDC:SRA:read_filter;
//! table NCBI:SRA:tbl:reads #1 {
//!     column INSDC:SRA:read_filter READ_FILTER;
//!     column U32 READ_LEN;
//! };
//! database NCBI:SRA:db #1 {
//!     table NCBI:SRA:tbl:reads SEQUENCE;
//! };
//! ```
//!
//! `//` starts a comment that runs to the end of the line.

use std::collections::{BTreeMap, BTreeSet};

use snafu::{Backtrace, prelude::*};

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while parsing or querying a schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The text does not follow the grammar.
    #[snafu(display("Schema syntax error at line {line}: {msg}"))]
    Syntax {
        /// 1-based line of the offending token.
        line: usize,
        /// What was expected.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A type name does not resolve to a primitive type.
    #[snafu(display("Unknown type {name}"))]
    UnknownType {
        /// The unresolved type name.
        name: String,
    },

    /// A typedef chain refers back to itself.
    #[snafu(display("Cyclic typedef involving {name}"))]
    CyclicTypedef {
        /// A type on the cycle.
        name: String,
    },

    /// The same name is declared twice.
    #[snafu(display("Duplicate declaration of {name}"))]
    Duplicate {
        /// The redeclared name.
        name: String,
    },

    /// A database member refers to an undeclared table type.
    #[snafu(display("Database {database} member {member} has undeclared table type {type_name}"))]
    UnknownMemberType {
        /// Declaring database.
        database: String,
        /// Member table name.
        member: String,
        /// Undeclared table type.
        type_name: String,
    },
}

/// Built-in element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Single bit.
    B1,
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 8-bit.
    I8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// ASCII text, one byte per element.
    Ascii,
    /// UTF-8 text, one byte per element.
    Utf8,
}

impl Primitive {
    /// Parse a primitive type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "B1" => Primitive::B1,
            "U8" => Primitive::U8,
            "U16" => Primitive::U16,
            "U32" => Primitive::U32,
            "U64" => Primitive::U64,
            "I8" => Primitive::I8,
            "I16" => Primitive::I16,
            "I32" => Primitive::I32,
            "I64" => Primitive::I64,
            "F32" => Primitive::F32,
            "F64" => Primitive::F64,
            "ascii" => Primitive::Ascii,
            "utf8" => Primitive::Utf8,
            _ => return None,
        })
    }

    /// Width of one element in bits.
    pub fn elem_bits(self) -> u32 {
        match self {
            Primitive::B1 => 1,
            Primitive::U8 | Primitive::I8 | Primitive::Ascii | Primitive::Utf8 => 8,
            Primitive::U16 | Primitive::I16 => 16,
            Primitive::U32 | Primitive::I32 | Primitive::F32 => 32,
            Primitive::U64 | Primitive::I64 | Primitive::F64 => 64,
        }
    }
}

/// A `column <type> <NAME>;` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDecl {
    /// Column name.
    pub name: String,
    /// Declared type name (primitive or typedef).
    pub type_name: String,
}

/// A `table <type> { ... }` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDecl {
    /// Declared table type name.
    pub name: String,
    /// Optional `#N` version.
    pub version: Option<u32>,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDecl>,
}

impl TableDecl {
    /// Declared type of column `name`.
    pub fn column_type(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.type_name.as_str())
    }
}

/// A `table <type> <NAME>;` member inside a database declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecl {
    /// Member table name.
    pub name: String,
    /// Declared table type of the member.
    pub type_name: String,
}

/// A `database <type> { ... }` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDecl {
    /// Declared database type name.
    pub name: String,
    /// Optional `#N` version.
    pub version: Option<u32>,
    /// Member tables in declaration order.
    pub tables: Vec<MemberDecl>,
}

impl DatabaseDecl {
    /// Declared table type of member `name`.
    pub fn member_type(&self, name: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.type_name.as_str())
    }
}

/// A parsed schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    version: Option<u32>,
    typedefs: BTreeMap<String, String>,
    tables: BTreeMap<String, TableDecl>,
    databases: BTreeMap<String, DatabaseDecl>,
}

/// Schema text paired with the type name an object instantiates.
///
/// This is what a `schema` metadata node holds: the text as the node value
/// and the type name as its `name` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Declared table or database type name.
    pub type_name: String,
    /// Verbatim schema text.
    pub text: String,
}

impl Schema {
    /// Parse and validate schema text.
    pub fn parse(text: &str) -> SchemaResult<Schema> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let schema = parser.schema()?;
        schema.validate()?;
        Ok(schema)
    }

    /// The `version N;` statement, if present.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Table declaration by type name.
    pub fn table(&self, type_name: &str) -> Option<&TableDecl> {
        self.tables.get(type_name)
    }

    /// Database declaration by type name.
    pub fn database(&self, type_name: &str) -> Option<&DatabaseDecl> {
        self.databases.get(type_name)
    }

    /// Whether `type_name` names a declared table or database.
    pub fn declares(&self, type_name: &str) -> bool {
        self.tables.contains_key(type_name) || self.databases.contains_key(type_name)
    }

    /// Follow typedefs from `type_name` down to a primitive.
    pub fn resolve_type(&self, type_name: &str) -> SchemaResult<Primitive> {
        let mut seen = BTreeSet::new();
        let mut cur = type_name;
        loop {
            if let Some(p) = Primitive::from_name(cur) {
                return Ok(p);
            }
            ensure!(
                seen.insert(cur),
                CyclicTypedefSnafu { name: cur }
            );
            cur = self
                .typedefs
                .get(cur)
                .map(String::as_str)
                .context(UnknownTypeSnafu { name: cur })?;
        }
    }

    fn validate(&self) -> SchemaResult<()> {
        for name in self.typedefs.keys() {
            self.resolve_type(name)?;
        }
        for table in self.tables.values() {
            for column in &table.columns {
                self.resolve_type(&column.type_name)?;
            }
        }
        for db in self.databases.values() {
            for member in &db.tables {
                ensure!(
                    self.tables.contains_key(&member.type_name),
                    UnknownMemberTypeSnafu {
                        database: &db.name,
                        member: &member.name,
                        type_name: &member.type_name,
                    }
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word(String),
    Version(u32),
    Open,
    Close,
    Semi,
}

fn tokenize(text: &str) -> SchemaResult<Vec<(Tok, usize)>> {
    let mut out = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let code = raw_line.split("//").next().unwrap_or_default();
        let mut chars = code.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            match c {
                c if c.is_whitespace() => {}
                '{' => out.push((Tok::Open, line)),
                '}' => out.push((Tok::Close, line)),
                ';' => out.push((Tok::Semi, line)),
                '#' => {
                    let mut end = start + 1;
                    while let Some((i, d)) = chars.peek().copied() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        end = i + 1;
                        chars.next();
                    }
                    let digits = &code[start + 1..end];
                    let version = digits.parse::<u32>().ok().context(SyntaxSnafu {
                        line,
                        msg: format!("expected version number after '#', found {digits:?}"),
                    })?;
                    out.push((Tok::Version(version), line));
                }
                c if is_word_char(c) => {
                    let mut end = start + c.len_utf8();
                    while let Some((i, d)) = chars.peek().copied() {
                        if !is_word_char(d) {
                            break;
                        }
                        end = i + d.len_utf8();
                        chars.next();
                    }
                    out.push((Tok::Word(code[start..end].to_string()), line));
                }
                other => {
                    return SyntaxSnafu {
                        line,
                        msg: format!("unexpected character {other:?}"),
                    }
                    .fail();
                }
            }
        }
    }
    Ok(out)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn fail<T>(&self, msg: impl Into<String>) -> SchemaResult<T> {
        SyntaxSnafu {
            line: self.line(),
            msg: msg.into(),
        }
        .fail()
    }

    fn word(&mut self, what: &str) -> SchemaResult<String> {
        if let Some(Tok::Word(w)) = self.peek().cloned() {
            self.pos += 1;
            Ok(w)
        } else {
            self.fail(format!("expected {what}"))
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> SchemaResult<()> {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            Ok(())
        } else {
            self.fail(format!("expected {what}"))
        }
    }

    fn optional_version(&mut self) -> Option<u32> {
        if let Some(Tok::Version(v)) = self.peek().cloned() {
            self.pos += 1;
            Some(v)
        } else {
            None
        }
    }

    fn optional_semi(&mut self) {
        if self.peek() == Some(&Tok::Semi) {
            self.pos += 1;
        }
    }

    fn schema(&mut self) -> SchemaResult<Schema> {
        let mut schema = Schema::default();
        while let Some(tok) = self.next() {
            let keyword = match tok {
                Tok::Word(w) => w,
                Tok::Semi => continue,
                _ => {
                    self.pos -= 1;
                    return self.fail("expected a declaration keyword");
                }
            };
            match keyword.as_str() {
                "version" => {
                    let v = self.word("version number")?;
                    let parsed = match v.parse::<u32>() {
                        Ok(n) => n,
                        Err(_) => return self.fail(format!("invalid version {v:?}")),
                    };
                    schema.version = Some(parsed);
                    self.expect(Tok::Semi, "';' after version")?;
                }
                "typedef" => {
                    let base = self.word("typedef base type")?;
                    let name = self.word("typedef name")?;
                    self.expect(Tok::Semi, "';' after typedef")?;
                    ensure!(
                        !schema.typedefs.contains_key(&name),
                        DuplicateSnafu { name: &name }
                    );
                    schema.typedefs.insert(name, base);
                }
                "table" => {
                    let decl = self.table_decl()?;
                    ensure!(
                        !schema.tables.contains_key(&decl.name),
                        DuplicateSnafu { name: &decl.name }
                    );
                    schema.tables.insert(decl.name.clone(), decl);
                }
                "database" => {
                    let decl = self.database_decl()?;
                    ensure!(
                        !schema.databases.contains_key(&decl.name),
                        DuplicateSnafu { name: &decl.name }
                    );
                    schema.databases.insert(decl.name.clone(), decl);
                }
                other => {
                    self.pos -= 1;
                    return self.fail(format!("unknown declaration {other:?}"));
                }
            }
        }
        Ok(schema)
    }

    fn table_decl(&mut self) -> SchemaResult<TableDecl> {
        let name = self.word("table type name")?;
        let version = self.optional_version();
        self.expect(Tok::Open, "'{' after table name")?;

        let mut columns: Vec<ColumnDecl> = Vec::new();
        loop {
            if self.peek() == Some(&Tok::Close) {
                self.pos += 1;
                break;
            }
            let kw = self.word("'column' or '}'")?;
            if kw != "column" {
                self.pos -= 1;
                return self.fail(format!("expected 'column', found {kw:?}"));
            }
            let type_name = self.word("column type")?;
            let col = self.word("column name")?;
            self.expect(Tok::Semi, "';' after column")?;
            ensure!(
                columns.iter().all(|c| c.name != col),
                DuplicateSnafu {
                    name: format!("{name}.{col}")
                }
            );
            columns.push(ColumnDecl {
                name: col,
                type_name,
            });
        }
        self.optional_semi();

        Ok(TableDecl {
            name,
            version,
            columns,
        })
    }

    fn database_decl(&mut self) -> SchemaResult<DatabaseDecl> {
        let name = self.word("database type name")?;
        let version = self.optional_version();
        self.expect(Tok::Open, "'{' after database name")?;

        let mut tables: Vec<MemberDecl> = Vec::new();
        loop {
            if self.peek() == Some(&Tok::Close) {
                self.pos += 1;
                break;
            }
            let kw = self.word("'table' or '}'")?;
            if kw != "table" {
                self.pos -= 1;
                return self.fail(format!("expected 'table', found {kw:?}"));
            }
            let type_name = self.word("member table type")?;
            let _ = self.optional_version();
            let member = self.word("member table name")?;
            self.expect(Tok::Semi, "';' after member table")?;
            ensure!(
                tables.iter().all(|m| m.name != member),
                DuplicateSnafu {
                    name: format!("{name}.{member}")
                }
            );
            tables.push(MemberDecl {
                name: member,
                type_name,
            });
        }
        self.optional_semi();

        Ok(DatabaseDecl {
            name,
            version,
            tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const READS: &str = r#"
version 1;
// filter values
typedef U8 INSDC:SRA:read_filter;
typedef U32 INSDC:coord:len;
table NCBI:SRA:tbl:reads #1 {
    column INSDC:SRA:read_filter READ_FILTER;
    column INSDC:coord:len READ_LEN;
    column ascii READ;
};
database NCBI:SRA:db #2 {
    table NCBI:SRA:tbl:reads #1 SEQUENCE;
};
"#;

    #[test]
    fn parses_tables_databases_and_typedefs() -> TestResult {
        let schema = Schema::parse(READS)?;

        assert_eq!(schema.version(), Some(1));
        let table = schema.table("NCBI:SRA:tbl:reads").expect("table decl");
        assert_eq!(table.version, Some(1));
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.column_type("READ_LEN"), Some("INSDC:coord:len"));

        let db = schema.database("NCBI:SRA:db").expect("db decl");
        assert_eq!(db.version, Some(2));
        assert_eq!(db.member_type("SEQUENCE"), Some("NCBI:SRA:tbl:reads"));

        assert!(schema.declares("NCBI:SRA:db"));
        assert!(!schema.declares("NCBI:SRA:other"));
        Ok(())
    }

    #[test]
    fn resolves_typedef_chains_to_primitives() -> TestResult {
        let schema = Schema::parse(
            "typedef U16 A; typedef A B; table T { column B X; };",
        )?;
        assert_eq!(schema.resolve_type("B")?, Primitive::U16);
        assert_eq!(schema.resolve_type("B")?.elem_bits(), 16);
        assert_eq!(schema.resolve_type("B1")?.elem_bits(), 1);
        Ok(())
    }

    #[test]
    fn unknown_column_type_is_rejected() {
        let err = Schema::parse("table T { column NOPE X; };").expect_err("unknown type");
        assert!(matches!(err, SchemaError::UnknownType { .. }));
    }

    #[test]
    fn cyclic_typedefs_are_rejected() {
        let err = Schema::parse("typedef B A; typedef A B;").expect_err("cycle");
        assert!(matches!(err, SchemaError::CyclicTypedef { .. }));
    }

    #[test]
    fn syntax_errors_report_line() {
        let err = Schema::parse("version 1;\ntable T {\n  column U8;\n};").expect_err("syntax");
        match err {
            SchemaError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("expected Syntax, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_member_type_is_rejected() {
        let err = Schema::parse("database D { table T X; };").expect_err("undeclared");
        assert!(matches!(err, SchemaError::UnknownMemberType { .. }));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = Schema::parse("table T { column U8 X; column U8 X; };").expect_err("dup");
        assert!(matches!(err, SchemaError::Duplicate { .. }));
    }
}
