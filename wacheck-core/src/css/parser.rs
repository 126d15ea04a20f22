//! Recursive-descent CSS 2 parser.
//!
//! Two entry points share one token stream and one set of productions:
//! `parse_stylesheet` for whole sheets and `parse_declarations` for the bare
//! declaration lists of `style` attributes.
//!
//! Syntax errors abort the parse with a `ParseError`. Failures inside a
//! production that parsed fine (an `@import` that cannot be fetched, an
//! at-rule that is not supported) do not: the production contributes nothing
//! and the failure is recorded on the `ParseContext`.

use std::str::FromStr;

use string_cache::DefaultAtom;

use super::lexer::{Token, TokenKind, tokenize};
use super::selector::{AttrOperator, Combinator, Selector};
use super::stylesheet::{MediaList, MediaRules, Property, Rule, Stylesheet};
use crate::ResourceLoader;
use crate::config::Config;
use crate::error::{ActionError, ParseError};
use crate::location::{Location, MemoryLoader};

type PResult<T> = Result<T, ParseError>;

// ---------------------------------------------------------------------------
// Parse context
// ---------------------------------------------------------------------------

/// State shared by a top-level parse and the sheets it imports.
pub struct ParseContext<'a> {
    location: Option<Location>,
    loader: &'a dyn ResourceLoader,
    config: &'a Config,
    depth: usize,
    chain: Vec<String>,
    diagnostics: Vec<ActionError>,
    traced: bool,
}

impl<'a> ParseContext<'a> {
    pub fn new(loader: &'a dyn ResourceLoader, config: &'a Config) -> Self {
        ParseContext {
            location: None,
            loader,
            config,
            depth: 0,
            chain: Vec::new(),
            diagnostics: Vec::new(),
            traced: false,
        }
    }

    /// Sets the location relative `@import` URLs resolve against.
    pub fn with_location(mut self, location: Location) -> Self {
        self.chain.push(location.as_str().to_string());
        self.location = Some(location);
        self
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Failures recorded so far, nested imports included.
    pub fn diagnostics(&self) -> &[ActionError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<ActionError> {
        self.diagnostics
    }

    /// Turns a failed production into an empty one. Only the first failure
    /// of a top-level parse reaches the log.
    fn soft<T: Default>(&mut self, result: Result<T, ActionError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                if !self.traced {
                    tracing::warn!("Ignoring failed CSS production: {}", err);
                    self.traced = true;
                }
                self.diagnostics.push(err);
                T::default()
            }
        }
    }

    fn load(&mut self, location: Location, depth: usize) -> Result<Stylesheet, ActionError> {
        let url = location.as_str().to_string();
        if self.chain.contains(&url) {
            return Err(ActionError::ImportCycle(url));
        }
        if depth > self.config.max_import_depth {
            return Err(ActionError::ImportDepth(self.config.max_import_depth));
        }

        let resource = self
            .loader
            .fetch(&location)
            .map_err(|source| ActionError::Load {
                url: url.clone(),
                source,
            })?;
        let text = resource.text();

        let mut chain = self.chain.clone();
        chain.push(url.clone());
        let mut nested = ParseContext {
            location: Some(location),
            loader: self.loader,
            config: self.config,
            depth,
            chain,
            diagnostics: Vec::new(),
            traced: self.traced,
        };
        let parsed = parse_stylesheet(&text, &mut nested);
        self.traced = nested.traced;
        self.diagnostics.append(&mut nested.diagnostics);
        parsed.map_err(|source| ActionError::Parse { url, source })
    }

    fn import(&mut self, href: &str, media: &MediaList) -> Result<Stylesheet, ActionError> {
        let location =
            Location::resolve(self.location.as_ref(), href).map_err(|source| ActionError::Load {
                url: href.to_string(),
                source,
            })?;
        tracing::debug!("Importing stylesheet {}", location);
        let mut sheet = self.load(location, self.depth + 1)?;
        sheet.restrict_to_media(media);
        Ok(sheet)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parses a complete stylesheet, resolving `@import` through the context's
/// loader as it goes.
pub fn parse_stylesheet(text: &str, ctx: &mut ParseContext<'_>) -> PResult<Stylesheet> {
    let tokens = tokenize(text);
    let mut parser = Parser::new(&tokens, text.len(), ctx);
    let sheet = parser.stylesheet()?;
    tracing::debug!("Parsed stylesheet with {} rules", sheet.len());
    Ok(sheet)
}

/// Parses a declaration list with no surrounding braces, as found in
/// `style` attributes.
pub fn parse_declarations(text: &str, ctx: &mut ParseContext<'_>) -> PResult<Vec<Property>> {
    let tokens = tokenize(text);
    let mut parser = Parser::new(&tokens, text.len(), ctx);
    parser.declaration_list(None)
}

/// Fetches and parses the stylesheet at `location`.
pub fn parse_location(
    location: &Location,
    ctx: &mut ParseContext<'_>,
) -> Result<Stylesheet, ActionError> {
    let depth = ctx.depth;
    ctx.load(location.clone(), depth)
}

impl FromStr for Stylesheet {
    type Err = ParseError;

    /// Parses a standalone sheet. `@import` rules have nothing to load from
    /// and contribute nothing.
    fn from_str(text: &str) -> PResult<Stylesheet> {
        let loader = MemoryLoader::new();
        let config = Config::default();
        let mut ctx = ParseContext::new(&loader, &config);
        parse_stylesheet(text, &mut ctx)
    }
}

// ---------------------------------------------------------------------------
// Productions
// ---------------------------------------------------------------------------

/// Deepest function nesting accepted in a declaration value.
const MAX_FUNCTION_NESTING: usize = 256;

struct Parser<'t, 'c, 'a> {
    tokens: &'t [Token],
    pos: usize,
    end: usize,
    /// Open function terms around the current position.
    nesting: usize,
    ctx: &'c mut ParseContext<'a>,
}

impl<'t, 'c, 'a> Parser<'t, 'c, 'a> {
    fn new(tokens: &'t [Token], end: usize, ctx: &'c mut ParseContext<'a>) -> Self {
        Parser {
            tokens,
            pos: 0,
            end,
            nesting: 0,
            ctx,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<&'t Token> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                token.span.start,
                format!("expected {what}, found `{}`", token.text),
            ),
            None => ParseError::new(self.end, format!("expected {what}, found end of input")),
        }
    }

    /// True when the next token directly follows the previous one, with no
    /// whitespace or comment in between.
    fn adjacent(&self) -> bool {
        match (self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)), self.peek()) {
            (Some(prev), Some(next)) => prev.span.end == next.span.start,
            _ => false,
        }
    }

    // -- stylesheet ----------------------------------------------------------

    fn stylesheet(&mut self) -> PResult<Stylesheet> {
        let mut sheet = Stylesheet::default();

        if self.eat(TokenKind::CharsetSym) {
            self.expect(TokenKind::String, "charset name")?;
            self.expect(TokenKind::Semicolon, "`;`")?;
        }

        let mut imports_allowed = true;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::ImportSym if imports_allowed => {
                    let imported = self.import()?;
                    sheet.extend(imported);
                }
                TokenKind::ImportSym | TokenKind::CharsetSym | TokenKind::AtKeyword => {
                    self.ignored_at_rule()?;
                }
                TokenKind::MediaSym => {
                    imports_allowed = false;
                    sheet.push(self.media()?);
                }
                TokenKind::PageSym => {
                    imports_allowed = false;
                    self.page()?;
                }
                TokenKind::FontFaceSym => {
                    imports_allowed = false;
                    self.bump();
                    self.declaration_block()?;
                }
                _ => {
                    imports_allowed = false;
                    let rules = self.ruleset()?;
                    sheet.push(MediaRules {
                        media: MediaList::new(),
                        rules,
                    });
                }
            }
        }
        Ok(sheet)
    }

    fn import(&mut self) -> PResult<Stylesheet> {
        self.expect(TokenKind::ImportSym, "`@import`")?;
        let href = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::String | TokenKind::Uri) => {
                self.bump();
                unescape(&t.text)
            }
            _ => return Err(self.unexpected("import URL")),
        };
        let media = if self.peek_kind() == Some(TokenKind::Ident) {
            self.medium_list()?
        } else {
            MediaList::new()
        };
        self.expect(TokenKind::Semicolon, "`;`")?;

        let result = self.ctx.import(&href, &media);
        Ok(self.ctx.soft(result))
    }

    /// Skips an at-rule up to its `;` or the end of its `{}` block.
    fn ignored_at_rule(&mut self) -> PResult<()> {
        let Some(keyword) = self.bump() else {
            return Ok(());
        };
        let name = keyword.text.trim_start_matches('@').to_ascii_lowercase();
        let mut depth = 0usize;
        loop {
            match self.bump().map(|t| t.kind) {
                Some(TokenKind::Semicolon) if depth == 0 => break,
                Some(TokenKind::LBrace) => depth += 1,
                Some(TokenKind::RBrace) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                Some(_) => {}
                None if depth == 0 => break,
                None => return Err(self.unexpected("`}`")),
            }
        }
        self.ctx.soft::<()>(Err(ActionError::IgnoredAtRule(name)));
        Ok(())
    }

    fn medium_list(&mut self) -> PResult<MediaList> {
        let mut media = MediaList::new();
        loop {
            let medium = self.expect(TokenKind::Ident, "media type")?;
            media.push(DefaultAtom::from(medium.text.to_ascii_lowercase()));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if media.iter().any(|m| &**m == "all") {
            media.clear();
        }
        Ok(media)
    }

    fn media(&mut self) -> PResult<MediaRules> {
        self.expect(TokenKind::MediaSym, "`@media`")?;
        let media = self.medium_list()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut rules = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    self.bump();
                    break;
                }
                Some(TokenKind::AtKeyword) => self.ignored_at_rule()?,
                Some(_) => rules.extend(self.ruleset()?),
                None => return Err(self.unexpected("`}`")),
            }
        }
        Ok(MediaRules { media, rules })
    }

    fn page(&mut self) -> PResult<()> {
        self.expect(TokenKind::PageSym, "`@page`")?;
        self.eat(TokenKind::Ident);
        if self.eat(TokenKind::Colon) {
            self.expect(TokenKind::Ident, "page selector")?;
        }
        self.declaration_block()?;
        Ok(())
    }

    // -- rulesets and selectors ----------------------------------------------

    fn ruleset(&mut self) -> PResult<Vec<Rule>> {
        let mut selectors = vec![self.selector()?];
        while self.eat(TokenKind::Comma) {
            selectors.push(self.selector()?);
        }
        let properties: std::rc::Rc<[Property]> = self.declaration_block()?.into();
        Ok(selectors
            .into_iter()
            .map(|selector| Rule {
                selector,
                properties: properties.clone(),
            })
            .collect())
    }

    fn selector(&mut self) -> PResult<Selector> {
        let mut selector = self.simple_selector()?;
        loop {
            let combinator = match self.peek_kind() {
                Some(TokenKind::Plus) => {
                    self.bump();
                    Combinator::AdjacentSibling
                }
                Some(TokenKind::Gt) => {
                    self.bump();
                    Combinator::Child
                }
                Some(kind) if starts_simple_selector(kind) => Combinator::Descendant,
                _ => break,
            };
            let right = self.simple_selector()?;
            selector = Selector::combine(selector, combinator, right);
        }
        Ok(selector)
    }

    fn simple_selector(&mut self) -> PResult<Selector> {
        let mut parts = Vec::new();
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                self.bump();
                parts.push(Selector::type_selector(&t.text));
            }
            Some(t) if t.kind == TokenKind::Star => {
                self.bump();
                parts.push(Selector::Universal);
            }
            _ => {}
        }
        while matches!(
            self.peek_kind(),
            Some(TokenKind::Hash | TokenKind::Dot | TokenKind::LBracket | TokenKind::Colon)
        ) {
            // `a .b` is two selectors, `a.b` is one.
            if !parts.is_empty() && !self.adjacent() {
                break;
            }
            parts.push(self.selector_spec()?);
        }
        if parts.is_empty() {
            return Err(self.unexpected("selector"));
        }
        Ok(Selector::set(parts))
    }

    fn selector_spec(&mut self) -> PResult<Selector> {
        let Some(token) = self.bump() else {
            return Err(self.unexpected("selector"));
        };
        match token.kind {
            TokenKind::Hash => Ok(Selector::id(&token.text[1..])),
            TokenKind::Dot => {
                let name = self.expect(TokenKind::Ident, "class name")?;
                Ok(Selector::class(&name.text))
            }
            TokenKind::LBracket => {
                let name = self.expect(TokenKind::Ident, "attribute name")?;
                let operator = match self.peek_kind() {
                    Some(TokenKind::Eq) => Some(AttrOperator::Equals),
                    Some(TokenKind::Includes) => Some(AttrOperator::SpaceList),
                    Some(TokenKind::DashMatch) => Some(AttrOperator::CommaList),
                    _ => None,
                };
                let selector = match operator {
                    Some(op) => {
                        self.bump();
                        let value = match self.peek() {
                            Some(t) if t.kind == TokenKind::Ident => t.text.clone(),
                            Some(t) if t.kind == TokenKind::String => unescape(&t.text),
                            _ => return Err(self.unexpected("attribute value")),
                        };
                        self.bump();
                        Selector::attribute(&name.text, op, Some(&value))
                    }
                    None => Selector::attribute(&name.text, AttrOperator::Present, None),
                };
                self.expect(TokenKind::RBracket, "`]`")?;
                Ok(selector)
            }
            TokenKind::Colon => {
                // `::name` pseudo-elements read as pseudo-classes that never match.
                self.eat(TokenKind::Colon);
                match self.peek() {
                    Some(t) if t.kind == TokenKind::Ident => {
                        self.bump();
                        Ok(Selector::pseudo(&t.text, Vec::new()))
                    }
                    Some(t) if t.kind == TokenKind::Function => {
                        self.bump();
                        let name = t.text.trim_end_matches('(');
                        let mut args = Vec::new();
                        if let Some(arg) = self.peek().filter(|a| a.kind == TokenKind::Ident) {
                            self.bump();
                            args.push(arg.text.clone());
                        }
                        self.expect(TokenKind::RParen, "`)`")?;
                        Ok(Selector::pseudo(name, args))
                    }
                    _ => Err(self.unexpected("pseudo-class")),
                }
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("selector"))
            }
        }
    }

    // -- declarations ----------------------------------------------------------

    fn declaration_block(&mut self) -> PResult<Vec<Property>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let properties = self.declaration_list(Some(TokenKind::RBrace))?;
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(properties)
    }

    /// Declarations up to (not including) `end`, or to the end of input.
    fn declaration_list(&mut self, end: Option<TokenKind>) -> PResult<Vec<Property>> {
        let mut properties = Vec::new();
        loop {
            let next = self.peek_kind();
            if next == end {
                break;
            }
            if next == Some(TokenKind::Semicolon) {
                self.bump();
                continue;
            }
            properties.push(self.declaration()?);
            let next = self.peek_kind();
            if next != end && next != Some(TokenKind::Semicolon) {
                return Err(self.unexpected("`;`"));
            }
        }
        Ok(properties)
    }

    fn declaration(&mut self) -> PResult<Property> {
        let name = self.expect(TokenKind::Ident, "property name")?;
        self.expect(TokenKind::Colon, "`:`")?;
        let value = self.expr()?;
        let important = self.eat(TokenKind::ImportantSym);
        Ok(Property::new(&name.text, &value, important))
    }

    fn expr(&mut self) -> PResult<String> {
        let mut value = self.term()?;
        loop {
            let operator = match self.peek_kind() {
                Some(TokenKind::Slash) => Some("/"),
                Some(TokenKind::Comma) => Some(","),
                _ => None,
            };
            if operator.is_some() {
                self.bump();
            } else if !self.peek_kind().is_some_and(starts_term) {
                break;
            }
            value.push_str(operator.unwrap_or(" "));
            value.push_str(&self.term()?);
        }
        Ok(value)
    }

    fn term(&mut self) -> PResult<String> {
        let Some(token) = self.bump() else {
            return Err(self.unexpected("value"));
        };
        match token.kind {
            TokenKind::Plus | TokenKind::Minus => match self.peek_kind() {
                Some(TokenKind::Number | TokenKind::Percentage | TokenKind::Dimension) => {
                    let number = self.bump().map_or("", |t| t.text.as_str());
                    Ok(format!("{}{}", token.text, number))
                }
                Some(TokenKind::Function) => Ok(format!("{}{}", token.text, self.term()?)),
                _ => Err(self.unexpected("number")),
            },
            TokenKind::Number
            | TokenKind::Percentage
            | TokenKind::Dimension
            | TokenKind::Ident
            | TokenKind::UnicodeRange
            | TokenKind::Hash => Ok(token.text.clone()),
            TokenKind::String => Ok(quoted(&unescape(&token.text))),
            TokenKind::Uri => Ok(format!("url({})", quoted(&unescape(&token.text)))),
            TokenKind::Function => {
                if self.nesting >= MAX_FUNCTION_NESTING {
                    return Err(ParseError::new(
                        token.span.start,
                        format!("functions nested deeper than {MAX_FUNCTION_NESTING}"),
                    ));
                }
                self.nesting += 1;
                let args = self.expr();
                self.nesting -= 1;
                let args = args?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(format!("{}{})", token.text, args))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("value"))
            }
        }
    }
}

fn starts_simple_selector(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::Star
            | TokenKind::Hash
            | TokenKind::Dot
            | TokenKind::LBracket
            | TokenKind::Colon
    )
}

fn starts_term(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Number
            | TokenKind::Percentage
            | TokenKind::Dimension
            | TokenKind::Ident
            | TokenKind::UnicodeRange
            | TokenKind::Hash
            | TokenKind::String
            | TokenKind::Uri
            | TokenKind::Function
    )
}

fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    // Writing into a String cannot fail.
    let _ = cssparser::serialize_string(text, &mut out);
    out
}

/// Resolves backslash escapes in the body of a string or URL token.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            None => out.push('\\'),
            // Escaped newline: a line continuation.
            Some('\n' | '\x0C') => {
                chars.next();
            }
            Some('\r') => {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some(c) if c.is_ascii_hexdigit() => {
                let mut code = 0u32;
                let mut digits = 0;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(16)) {
                    if digits == 6 {
                        break;
                    }
                    code = code * 16 + d;
                    digits += 1;
                    chars.next();
                }
                if matches!(chars.peek(), Some(' ' | '\t' | '\n' | '\x0C')) {
                    chars.next();
                } else if chars.peek() == Some(&'\r') {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                out.push(char::from_u32(code).filter(|c| *c != '\0').unwrap_or('\u{FFFD}'));
            }
            Some(c) => {
                chars.next();
                out.push(c);
            }
        }
    }
    out
}
