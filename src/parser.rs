//! Statement-level grammar driver. Parses SDL statements and feeds
//! the dispatcher entry points, continuing across recoverable errors
//! the way the dispatcher's failure contract expects.

use crate::dispatch::{Dispatcher, OptValue, OptionKey};
use crate::error::{SdlError, Severity};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::model::aggregate::{AggregateKind, CommentPosition};
use crate::model::entry::Passing;
use crate::model::scalar::ScalarKind;
use crate::model::{Radix, TypeRef, Value};
use crate::SourceLocation;

pub fn parse_source(
    src: &str,
    dispatcher: &mut Dispatcher,
) -> Result<(), SdlError> {
    Parser::new(src, dispatcher, false)?.run()
}

pub fn parse_source_traced(
    src: &str,
    dispatcher: &mut Dispatcher,
    trace: bool,
) -> Result<(), SdlError> {
    Parser::new(src, dispatcher, trace)?.run()
}

struct Parser<'src, 'd> {
    lexer: Lexer<'src>,
    current: Token,
    dispatcher: &'d mut Dispatcher,
    trace: bool,
}

/// A statement's worth of collected options, flushed in the order the
/// dispatcher expects for the context.
type Opts = Vec<(OptionKey, OptValue)>;

fn scalar_keyword(kw: &str) -> Option<ScalarKind> {
    use ScalarKind::*;
    Some(match kw {
        "BYTE" => Byte,
        "WORD" => Word,
        "LONG" | "LONGWORD" => Long,
        "QUAD" | "QUADWORD" => Quad,
        "OCTA" | "OCTAWORD" => Octa,
        "SFLOAT" | "S_FLOAT" => SFloat,
        "TFLOAT" | "T_FLOAT" => TFloat,
        "DFLOAT" | "D_FLOAT" => DFloat,
        "GFLOAT" | "G_FLOAT" => GFloat,
        "HFLOAT" | "H_FLOAT" => HFloat,
        "XFLOAT" | "X_FLOAT" => XFloat,
        "FFLOAT" | "F_FLOAT" => FFloat,
        "DECIMAL" => Decimal,
        "BITFIELD" => Bitfield,
        "CHARACTER" | "CHAR" => Char,
        "ADDRESS" => Addr,
        "ADDRESS_LONG" => AddrLong,
        "ADDRESS_QUAD" => AddrQuad,
        "ADDRESS_HARDWARE" => AddrHw,
        "POINTER" => Ptr,
        "POINTER_LONG" => PtrLong,
        "POINTER_QUAD" => PtrQuad,
        "POINTER_HARDWARE" => PtrHw,
        "ANY" => Any,
        "BOOLEAN" => Boolean,
        "VOID" => Void,
        _ => return None,
    })
}

fn complex_of(kind: ScalarKind) -> ScalarKind {
    use ScalarKind::*;
    match kind {
        SFloat => SFloatComplex,
        TFloat => TFloatComplex,
        DFloat => DFloatComplex,
        GFloat => GFloatComplex,
        HFloat => HFloatComplex,
        XFloat => XFloatComplex,
        FFloat => FFloatComplex,
        other => other,
    }
}

fn bitfield_host(kind: ScalarKind) -> ScalarKind {
    use ScalarKind::*;
    match kind {
        Byte => BitfieldByte,
        Word => BitfieldWord,
        Long => BitfieldLong,
        Quad => BitfieldQuad,
        Octa => BitfieldOcta,
        _ => Bitfield,
    }
}

impl<'src, 'd> Parser<'src, 'd> {
    fn new(
        src: &'src str,
        dispatcher: &'d mut Dispatcher,
        trace: bool,
    ) -> Result<Self, SdlError> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            dispatcher,
            trace,
        })
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation {
            first_line: self.current.line,
            first_col: self.current.column,
            last_line: self.current.line,
            last_col: self.current.column,
        }
    }

    fn advance(&mut self) -> Result<Token, SdlError> {
        let next = loop {
            match self.lexer.next_token() {
                Ok(token) => break token,
                Err(err) => {
                    let loc = SourceLocation::line(self.lexer.line());
                    self.dispatcher.report(loc, err)?;
                }
            }
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn keyword(&self) -> Option<String> {
        (self.current.kind == TokenKind::Name)
            .then(|| self.current.text.to_ascii_uppercase())
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.keyword().as_deref() == Some(kw)
    }

    /// Forward a dispatcher result: recoverable errors were already
    /// recorded, only fatal ones stop the parse.
    fn dispatched(
        &mut self,
        result: Result<(), SdlError>,
    ) -> Result<(), SdlError> {
        match result {
            Err(err) if err.severity() == Severity::Fatal => Err(err),
            _ => Ok(()),
        }
    }

    fn report(&mut self, err: SdlError) -> Result<(), SdlError> {
        let loc = self.loc();
        self.dispatcher.report(loc, err)
    }

    fn skip_to_semicolon(&mut self) -> Result<(), SdlError> {
        while !matches!(
            self.current.kind,
            TokenKind::Semicolon | TokenKind::Eof
        ) {
            self.advance()?;
        }
        if self.current.kind == TokenKind::Semicolon {
            self.advance()?;
        }
        Ok(())
    }

    fn expect_semicolon(&mut self) -> Result<(), SdlError> {
        if self.current.kind == TokenKind::Semicolon {
            self.advance()?;
            return Ok(());
        }
        self.report(SdlError::Syntax {
            token: self.current.text.clone(),
        })?;
        self.skip_to_semicolon()
    }

    fn expect_name(&mut self) -> Result<Option<String>, SdlError> {
        if self.current.kind == TokenKind::Name {
            let token = self.advance()?;
            return Ok(Some(token.text));
        }
        self.report(SdlError::Syntax {
            token: self.current.text.clone(),
        })?;
        Ok(None)
    }

    fn expect_int(&mut self) -> Result<Option<i128>, SdlError> {
        if self.current.kind == TokenKind::Integer {
            let token = self.advance()?;
            return Ok(token.value);
        }
        self.report(SdlError::Syntax {
            token: self.current.text.clone(),
        })?;
        Ok(None)
    }

    fn run(&mut self) -> Result<(), SdlError> {
        while self.current.kind != TokenKind::Eof {
            self.statement()?;
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<(), SdlError> {
        if self.current.kind == TokenKind::Comment {
            let loc = self.loc();
            let token = self.advance()?;
            let position = if token.line_start {
                CommentPosition::Line
            } else {
                CommentPosition::Middle
            };
            let r =
                self.dispatcher.comment(loc, &token.text, position);
            return self.dispatched(r);
        }
        if self.current.kind == TokenKind::Semicolon {
            self.advance()?;
            return Ok(());
        }
        let Some(kw) = self.keyword() else {
            self.report(SdlError::Syntax {
                token: self.current.text.clone(),
            })?;
            return self.skip_to_semicolon();
        };
        if self.trace {
            eprintln!(
                "sdlc: line {:>4}: {}",
                self.current.line, kw
            );
        }
        match kw.as_str() {
            "MODULE" => self.module_statement(),
            "END_MODULE" => self.end_module_statement(),
            "DECLARE" => self.declare_statement(),
            "ITEM" => self.item_statement(),
            "CONSTANT" => self.constant_statement(),
            "AGGREGATE" => self.aggregate_statement(),
            "END" => self.end_statement(),
            "ENTRY" => self.entry_statement(),
            "LITERAL" => self.literal_statement(),
            "IFSYMBOL" | "IF_SYMBOL" => self.if_symbol_statement(),
            "ELSE_IFSYMBOL" | "ELSE_IF_SYMBOL" | "ELSEIF_SYMBOL" => {
                self.else_if_statement()
            }
            "ELSE" => self.else_statement(),
            "END_IFSYMBOL" | "END_IF_SYMBOL" => self.end_if_statement(),
            "IFLANGUAGE" | "IF_LANGUAGE" => self.if_language_statement(),
            "END_IFLANGUAGE" | "END_IF_LANGUAGE" => {
                self.end_if_language_statement()
            }
            _ if self.dispatcher.in_aggregate() => {
                self.member_statement()
            }
            // a gated-out region parses without complaint
            _ if !self.dispatcher.processing() => {
                self.skip_to_semicolon()
            }
            _ => {
                self.report(SdlError::Syntax {
                    token: self.current.text.clone(),
                })?;
                self.skip_to_semicolon()
            }
        }
    }

    // ---- statements --------------------------------------------------

    fn module_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let mut ident = None;
        if self.at_keyword("IDENT") {
            self.advance()?;
            if self.current.kind == TokenKind::Str {
                ident = Some(self.advance()?.text);
            }
        }
        let r =
            self.dispatcher.start_module(loc, &name, ident.as_deref());
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn end_module_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let name = if self.current.kind == TokenKind::Name {
            Some(self.advance()?.text)
        } else {
            None
        };
        let r = self.dispatcher.end_module(loc, name.as_deref());
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn declare_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let (ty, mut opts) = self.parse_typespec()?;
        self.parse_options(loc, &mut opts, false)?;
        self.flush_options(loc, opts)?;
        let r = self.dispatcher.declare(loc, &name, ty);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn item_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        self.item_body(loc, name)
    }

    /// Member statements inside aggregates arrive without a leading
    /// keyword; nested aggregates open on STRUCTURE/UNION.
    fn member_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        if let Some(kw) = self.keyword() {
            if kw == "STRUCTURE" || kw == "UNION" {
                return self.aggregate_body(loc, name);
            }
        }
        self.item_body(loc, name)
    }

    fn item_body(
        &mut self,
        loc: SourceLocation,
        name: String,
    ) -> Result<(), SdlError> {
        let (ty, mut opts) = self.parse_typespec()?;
        self.parse_options(loc, &mut opts, false)?;
        if self.dispatcher.in_aggregate() {
            // options attach to the member just opened
            let r = self.dispatcher.item(loc, &name, ty);
            self.dispatched(r)?;
            self.flush_options(loc, opts)?;
        } else {
            self.flush_options(loc, opts)?;
            let r = self.dispatcher.item(loc, &name, ty);
            self.dispatched(r)?;
        }
        self.expect_semicolon()
    }

    fn aggregate_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        self.aggregate_body(loc, name)
    }

    fn aggregate_body(
        &mut self,
        loc: SourceLocation,
        name: String,
    ) -> Result<(), SdlError> {
        let mut kind = None;
        if let Some(kw) = self.keyword() {
            match kw.as_str() {
                "STRUCTURE" => {
                    self.advance()?;
                    kind = Some(AggregateKind::Structure);
                }
                "UNION" => {
                    self.advance()?;
                    kind = Some(AggregateKind::Union);
                }
                _ => {}
            }
        }
        // a scalar where STRUCTURE/UNION belongs coerces to a union
        // floored at that scalar
        if let Some(kw) = self.keyword() {
            if let Some(scalar) = scalar_keyword(&kw) {
                self.advance()?;
                kind = Some(AggregateKind::ImplicitUnion(scalar));
            }
        }
        let Some(kind) = kind else {
            self.report(SdlError::Syntax {
                token: self.current.text.clone(),
            })?;
            return self.skip_to_semicolon();
        };
        let r = self.dispatcher.aggregate_begin(loc, &name, kind);
        self.dispatched(r)?;
        let mut opts = Vec::new();
        self.parse_options(loc, &mut opts, false)?;
        // inside the open aggregate these configure the header
        self.flush_options(loc, opts)?;
        self.expect_semicolon()
    }

    fn end_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let name = if self.current.kind == TokenKind::Name {
            Some(self.advance()?.text)
        } else {
            None
        };
        let r = self.dispatcher.aggregate_end(loc, name.as_deref());
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn constant_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        // names (with commas and per-item comments) run until EQUALS
        let mut names = String::new();
        loop {
            match self.current.kind {
                TokenKind::Name if self.at_keyword("EQUALS") => break,
                TokenKind::Name => {
                    names.push_str(&self.advance()?.text);
                }
                TokenKind::Comma => {
                    self.advance()?;
                    names.push(',');
                }
                TokenKind::Comment => {
                    let token = self.advance()?;
                    names.push_str(&format!(" /* {} */ ", token.text));
                }
                _ => break,
            }
        }
        if !self.at_keyword("EQUALS") {
            self.report(SdlError::Syntax {
                token: self.current.text.clone(),
            })?;
            return self.skip_to_semicolon();
        }
        self.advance()?;
        let value = self.parse_value()?;
        let mut opts = Vec::new();
        self.parse_options(loc, &mut opts, false)?;
        self.flush_options(loc, opts)?;
        let r = self.dispatcher.constant_list(loc, &names, value);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn entry_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let mut opts = Vec::new();
        self.parse_options(loc, &mut opts, true)?;
        self.flush_options(loc, opts)?;
        let r = self.dispatcher.entry(loc, &name);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn literal_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let r = self.dispatcher.literal_begin(loc);
        self.dispatched(r)?;
        if self.current.kind == TokenKind::Semicolon {
            // swallow the rest of the LITERAL; line, then pass raw
            // lines through until the end marker
            let _ = self.lexer.raw_line();
        }
        loop {
            let line_no = self.lexer.line();
            let Some(line) = self.lexer.raw_line() else {
                break;
            };
            let trimmed = line.trim().trim_end_matches(';').trim();
            if trimmed.eq_ignore_ascii_case("END_LITERAL") {
                break;
            }
            let r = self
                .dispatcher
                .literal_line(SourceLocation::line(line_no), &line);
            self.dispatched(r)?;
        }
        let r = self.dispatcher.literal_end(loc);
        self.dispatched(r)?;
        // resync the token stream past the raw region
        self.current = loop {
            match self.lexer.next_token() {
                Ok(token) => break token,
                Err(err) => {
                    let loc = SourceLocation::line(self.lexer.line());
                    self.dispatcher.report(loc, err)?;
                }
            }
        };
        Ok(())
    }

    fn if_symbol_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let r = self.dispatcher.if_symbol(loc, &name);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn else_if_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let r = self.dispatcher.else_if_symbol(loc, &name);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn else_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let r = self.dispatcher.else_branch(loc);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn end_if_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let r = self.dispatcher.end_if_symbol(loc);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn if_language_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let Some(name) = self.expect_name()? else {
            return self.skip_to_semicolon();
        };
        let r = self.dispatcher.if_language(loc, &name);
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    fn end_if_language_statement(&mut self) -> Result<(), SdlError> {
        let loc = self.loc();
        self.advance()?;
        let name = if self.current.kind == TokenKind::Name {
            Some(self.advance()?.text)
        } else {
            None
        };
        let r =
            self.dispatcher.end_if_language(loc, name.as_deref());
        self.dispatched(r)?;
        self.expect_semicolon()
    }

    // ---- shared pieces -----------------------------------------------

    fn flush_options(
        &mut self,
        loc: SourceLocation,
        opts: Opts,
    ) -> Result<(), SdlError> {
        for (key, value) in opts {
            let r = self.dispatcher.option(loc, key, value);
            self.dispatched(r)?;
        }
        Ok(())
    }

    fn parse_value(&mut self) -> Result<Value, SdlError> {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                match self.expect_int()? {
                    Some(v) => Ok(Value::Int(-v)),
                    None => Ok(Value::Int(0)),
                }
            }
            TokenKind::Integer => {
                let token = self.advance()?;
                Ok(Value::Int(token.value.unwrap_or(0)))
            }
            TokenKind::Str => {
                let token = self.advance()?;
                Ok(Value::Str(token.text))
            }
            TokenKind::Name => {
                let token = self.advance()?;
                match self.dispatcher.local_value(&token.text) {
                    Some(v) => Ok(Value::Int(v)),
                    None => {
                        self.report(SdlError::Parse {
                            detail: format!(
                                "\"{}\" does not name a value",
                                token.text
                            ),
                        })?;
                        Ok(Value::Int(0))
                    }
                }
            }
            _ => {
                self.report(SdlError::Syntax {
                    token: self.current.text.clone(),
                })?;
                Ok(Value::Int(0))
            }
        }
    }

    /// Type specification: a scalar keyword with its inline
    /// attributes, or a user type name.
    fn parse_typespec(&mut self) -> Result<(TypeRef, Opts), SdlError> {
        let mut opts = Vec::new();
        let Some(kw) = self.keyword() else {
            self.report(SdlError::Syntax {
                token: self.current.text.clone(),
            })?;
            return Ok((TypeRef::Scalar(ScalarKind::Any), opts));
        };
        let Some(mut kind) = scalar_keyword(&kw) else {
            // a user type
            let token = self.advance()?;
            match self.dispatcher.lookup_type(&token.text) {
                Some(ty) => return Ok((ty, opts)),
                None => {
                    self.report(SdlError::Parse {
                        detail: format!(
                            "\"{}\" does not name a type",
                            token.text
                        ),
                    })?;
                    return Ok((TypeRef::Scalar(ScalarKind::Any), opts));
                }
            }
        };
        self.advance()?;
        match kind {
            ScalarKind::Bitfield => {
                if let Some(host) =
                    self.keyword().as_deref().and_then(scalar_keyword)
                {
                    let hosted = bitfield_host(host);
                    if hosted != ScalarKind::Bitfield {
                        self.advance()?;
                        kind = hosted;
                    }
                }
            }
            ScalarKind::Char => {
                if self.at_keyword("LENGTH") {
                    self.advance()?;
                    if self.current.kind == TokenKind::Star {
                        self.advance()?;
                        opts.push((OptionKey::Length, OptValue::Star));
                    } else if let Some(n) = self.expect_int()? {
                        opts.push((
                            OptionKey::Length,
                            OptValue::Int(n),
                        ));
                    }
                } else if self.current.kind == TokenKind::Star {
                    self.advance()?;
                    opts.push((OptionKey::Length, OptValue::Star));
                }
                if self.at_keyword("VARYING") {
                    self.advance()?;
                    kind = ScalarKind::CharVary;
                }
            }
            ScalarKind::Decimal => {
                if self.at_keyword("PRECISION") {
                    self.advance()?;
                    if let Some(p) = self.expect_int()? {
                        opts.push((
                            OptionKey::Precision,
                            OptValue::Int(p),
                        ));
                    }
                }
                if self.at_keyword("SCALE") {
                    self.advance()?;
                    if let Some(s) = self.expect_int()? {
                        opts.push((OptionKey::Scale, OptValue::Int(s)));
                    }
                }
            }
            k if k.is_address() => {
                if self.current.kind == TokenKind::LParen {
                    self.advance()?;
                    if let Some(name) = self.expect_name()? {
                        match self.dispatcher.lookup_type(&name) {
                            Some(sub) => opts.push((
                                OptionKey::SubType,
                                OptValue::Type(sub),
                            )),
                            None => {
                                self.report(SdlError::Parse {
                                    detail: format!(
                                        "\"{name}\" does not name a type"
                                    ),
                                })?;
                            }
                        }
                    }
                    if self.current.kind == TokenKind::RParen {
                        self.advance()?;
                    }
                }
            }
            ScalarKind::SFloat | ScalarKind::TFloat
            | ScalarKind::DFloat | ScalarKind::GFloat
            | ScalarKind::HFloat | ScalarKind::XFloat
            | ScalarKind::FFloat => {
                if self.at_keyword("COMPLEX") {
                    self.advance()?;
                    kind = complex_of(kind);
                }
            }
            _ => {}
        }
        Ok((TypeRef::Scalar(kind), opts))
    }

    /// Trailing options of a statement; `entry_context` also accepts
    /// entry-only constructs like PARAMETER lists.
    fn parse_options(
        &mut self,
        loc: SourceLocation,
        opts: &mut Opts,
        entry_context: bool,
    ) -> Result<(), SdlError> {
        loop {
            let Some(kw) = self.keyword() else {
                return Ok(());
            };
            match kw.as_str() {
                "PREFIX" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Prefix, OptValue::Str(v)));
                    }
                }
                "TAG" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Tag, OptValue::Str(v)));
                    }
                }
                "BASEALIGN" => {
                    self.advance()?;
                    if let Some(n) = self.expect_int()? {
                        opts.push((
                            OptionKey::BaseAlign,
                            OptValue::Int(n),
                        ));
                    }
                }
                "ALIGN" => {
                    self.advance()?;
                    opts.push((OptionKey::Align, OptValue::Flag));
                }
                "NOALIGN" => {
                    self.advance()?;
                    opts.push((OptionKey::NoAlign, OptValue::Flag));
                }
                "DIMENSION" => {
                    self.advance()?;
                    self.parse_dimension(loc, opts)?;
                }
                "LENGTH" => {
                    self.advance()?;
                    if self.current.kind == TokenKind::Star {
                        self.advance()?;
                        opts.push((OptionKey::Length, OptValue::Star));
                    } else if let Some(n) = self.expect_int()? {
                        opts.push((
                            OptionKey::Length,
                            OptValue::Int(n),
                        ));
                    }
                }
                "MASK" => {
                    self.advance()?;
                    opts.push((OptionKey::Mask, OptValue::Flag));
                }
                "SIGNED" => {
                    self.advance()?;
                    opts.push((OptionKey::Signed, OptValue::Flag));
                }
                "COMMON" => {
                    self.advance()?;
                    opts.push((OptionKey::Common, OptValue::Flag));
                }
                "GLOBAL" => {
                    self.advance()?;
                    opts.push((OptionKey::Global, OptValue::Flag));
                }
                "TYPEDEF" => {
                    self.advance()?;
                    opts.push((OptionKey::Typedef, OptValue::Flag));
                }
                "BASED" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Based, OptValue::Str(v)));
                    }
                }
                "MARKER" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Marker, OptValue::Str(v)));
                    }
                }
                "ORIGIN" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Origin, OptValue::Str(v)));
                    }
                }
                "COUNTER" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((
                            OptionKey::Counter,
                            OptValue::Str(v),
                        ));
                    }
                }
                "INCREMENT" => {
                    self.advance()?;
                    if let Some(n) = self.expect_int()? {
                        opts.push((
                            OptionKey::Increment,
                            OptValue::Int(n),
                        ));
                    }
                }
                "RADIX" => {
                    self.advance()?;
                    let radix = match self.keyword().as_deref() {
                        Some("DEC") | Some("DECIMAL") => {
                            Some(Radix::Decimal)
                        }
                        Some("OCT") | Some("OCTAL") => Some(Radix::Octal),
                        Some("HEX") => Some(Radix::Hex),
                        Some("BIN") | Some("BINARY") => {
                            Some(Radix::Binary)
                        }
                        _ => None,
                    };
                    match radix {
                        Some(r) => {
                            self.advance()?;
                            opts.push((
                                OptionKey::Radix,
                                OptValue::Radix(r),
                            ));
                        }
                        None => {
                            self.report(SdlError::Syntax {
                                token: self.current.text.clone(),
                            })?;
                        }
                    }
                }
                "ENUMERATE" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((
                            OptionKey::Enumerate,
                            OptValue::Str(v),
                        ));
                    }
                }
                "ALIAS" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Alias, OptValue::Str(v)));
                    }
                }
                "LINKAGE" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((
                            OptionKey::Linkage,
                            OptValue::Str(v),
                        ));
                    }
                }
                "TYPENAME" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((
                            OptionKey::TypeName,
                            OptValue::Str(v),
                        ));
                    }
                }
                "VARIABLE" => {
                    self.advance()?;
                    opts.push((OptionKey::Variable, OptValue::Flag));
                }
                "RETURNS" => {
                    self.advance()?;
                    let (ty, _extras) = self.parse_typespec()?;
                    opts.push((
                        OptionKey::ReturnsType,
                        OptValue::Type(ty),
                    ));
                    if self.at_keyword("NAMED") {
                        self.advance()?;
                        if let Some(v) = self.name_or_string()? {
                            opts.push((
                                OptionKey::ReturnsNamed,
                                OptValue::Str(v),
                            ));
                        }
                    }
                }
                "NAMED" => {
                    self.advance()?;
                    if let Some(v) = self.name_or_string()? {
                        opts.push((OptionKey::Named, OptValue::Str(v)));
                    }
                }
                "IN" => {
                    self.advance()?;
                    opts.push((OptionKey::In, OptValue::Flag));
                }
                "OUT" => {
                    self.advance()?;
                    opts.push((OptionKey::Out, OptValue::Flag));
                }
                "DEFAULT" => {
                    self.advance()?;
                    let value = self.parse_value()?;
                    opts.push((
                        OptionKey::Default,
                        OptValue::Val(value),
                    ));
                }
                "OPTIONAL" => {
                    self.advance()?;
                    opts.push((OptionKey::Optional, OptValue::Flag));
                }
                "LIST" => {
                    self.advance()?;
                    opts.push((OptionKey::List, OptValue::Flag));
                }
                "FILL" => {
                    self.advance()?;
                    opts.push((OptionKey::Fill, OptValue::Flag));
                }
                "PARAMETER" if entry_context => {
                    self.advance()?;
                    self.parse_parameters(loc)?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_dimension(
        &mut self,
        loc: SourceLocation,
        opts: &mut Opts,
    ) -> Result<(), SdlError> {
        let Some(first) = self.expect_int()? else {
            return Ok(());
        };
        let (lbound, hbound) = if self.current.kind == TokenKind::Colon {
            self.advance()?;
            match self.expect_int()? {
                Some(h) => (first as i64, h as i64),
                None => (first as i64, first as i64),
            }
        } else {
            (1i64, first as i64)
        };
        match self.dispatcher.dimension(loc, lbound, hbound) {
            Ok(key) => {
                opts.push((
                    OptionKey::Dimension,
                    OptValue::Int(key as i128),
                ));
                Ok(())
            }
            Err(err) if err.severity() == Severity::Fatal => Err(err),
            Err(_) => Ok(()),
        }
    }

    /// `PARAMETER ( typespec opts, ... )`: each parameter's options
    /// flow into the buffer right before the parameter directive.
    fn parse_parameters(
        &mut self,
        loc: SourceLocation,
    ) -> Result<(), SdlError> {
        if self.current.kind != TokenKind::LParen {
            self.report(SdlError::Syntax {
                token: self.current.text.clone(),
            })?;
            return Ok(());
        }
        self.advance()?;
        loop {
            if self.current.kind == TokenKind::RParen {
                self.advance()?;
                return Ok(());
            }
            let (ty, mut opts) = self.parse_typespec()?;
            let mut mechanism = Passing::ByReference;
            loop {
                match self.keyword().as_deref() {
                    Some("VALUE") => {
                        self.advance()?;
                        mechanism = Passing::ByValue;
                    }
                    Some("REFERENCE") => {
                        self.advance()?;
                        mechanism = Passing::ByReference;
                    }
                    Some(_) => {
                        let before = opts.len();
                        self.parse_options(loc, &mut opts, false)?;
                        if opts.len() == before {
                            break;
                        }
                    }
                    None => break,
                }
            }
            self.flush_options(loc, opts)?;
            let r = self.dispatcher.parameter(loc, ty, mechanism);
            self.dispatched(r)?;
            match self.current.kind {
                TokenKind::Comma => {
                    self.advance()?;
                }
                TokenKind::RParen => {}
                _ => {
                    self.report(SdlError::Syntax {
                        token: self.current.text.clone(),
                    })?;
                    return Ok(());
                }
            }
        }
    }

    fn name_or_string(&mut self) -> Result<Option<String>, SdlError> {
        match self.current.kind {
            TokenKind::Name | TokenKind::Str => {
                Ok(Some(self.advance()?.text))
            }
            _ => {
                self.report(SdlError::Syntax {
                    token: self.current.text.clone(),
                })?;
                Ok(None)
            }
        }
    }
}
