//! Record extractor: walks one JSON value, assigning matched tokens to
//! field-tree leaves.

use super::fields::{find_by_index_mut, find_by_name_mut, FieldNode};
use super::scanner::JsonParser;
use super::{JsonError, JsonResult, Token, TokenKind};

/// Consume exactly one JSON value (object or array) from `parser`,
/// writing matched tokens into the sibling chain headed by `fields`.
///
/// Matched primitives are copied into the node's token. Matched
/// containers record a composite `Object`/`Array` span; when the node
/// has children the walk recurses into the container, otherwise the
/// container is skipped. Unmatched containers are skipped. Keys are
/// compared byte-literally (escapes are not decoded).
pub fn extract(parser: &mut JsonParser<'_>, fields: &mut FieldNode) -> JsonResult<()> {
    let token = parser.next_token()?;
    match token.kind {
        TokenKind::ObjectBeg => extract_object(parser, fields),
        TokenKind::ArrayBeg => extract_array(parser, fields),
        _ => Err(JsonError),
    }
}

fn extract_object(parser: &mut JsonParser<'_>, fields: &mut FieldNode) -> JsonResult<()> {
    loop {
        let key = parser.next_token()?;
        if key.kind == TokenKind::ObjectEnd {
            return Ok(());
        }
        if !matches!(key.kind, TokenKind::String | TokenKind::StringEsc) {
            return Err(JsonError);
        }
        if parser.next_token()?.kind != TokenKind::Colon {
            return Err(JsonError);
        }

        let value = parser.next_token()?;
        let matched = find_by_name_mut(fields, key.bytes(parser.data()));
        assign_value(parser, matched, value)?;

        match parser.next_token()?.kind {
            TokenKind::ObjectEnd => return Ok(()),
            TokenKind::Comma => {}
            _ => return Err(JsonError),
        }
    }
}

fn extract_array(parser: &mut JsonParser<'_>, fields: &mut FieldNode) -> JsonResult<()> {
    let mut index: u32 = 0;
    loop {
        let value = parser.next_token()?;
        if value.kind == TokenKind::ArrayEnd {
            return Ok(());
        }
        let matched = find_by_index_mut(fields, index);
        assign_value(parser, matched, value)?;

        match parser.next_token()?.kind {
            TokenKind::ArrayEnd => return Ok(()),
            TokenKind::Comma => {}
            _ => return Err(JsonError),
        }
        index += 1;
    }
}

fn assign_value(
    parser: &mut JsonParser<'_>,
    matched: Option<&mut FieldNode>,
    value: Token,
) -> JsonResult<()> {
    match value.kind {
        TokenKind::String
        | TokenKind::StringEsc
        | TokenKind::Number
        | TokenKind::False
        | TokenKind::True
        | TokenKind::Null => {
            if let Some(field) = matched {
                field.token = value;
            }
            Ok(())
        }
        TokenKind::ObjectBeg => descend(parser, matched, value, TokenKind::Object),
        TokenKind::ArrayBeg => descend(parser, matched, value, TokenKind::Array),
        _ => Err(JsonError),
    }
}

/// Consume a container value. A matched node records the whole-container
/// span even when it has no children to recurse into.
fn descend(
    parser: &mut JsonParser<'_>,
    matched: Option<&mut FieldNode>,
    open: Token,
    composite: TokenKind,
) -> JsonResult<()> {
    match matched {
        Some(field) => {
            field.token = Token {
                kind: composite,
                begin: open.begin,
                end: open.begin,
            };
            match field.children.as_deref_mut() {
                Some(children) => {
                    parser.put_back(open)?;
                    extract(parser, children)?;
                }
                None => skip_container(parser, composite)?,
            }
            field.token.end = parser.cursor();
            Ok(())
        }
        None => skip_container(parser, composite),
    }
}

fn skip_container(parser: &mut JsonParser<'_>, composite: TokenKind) -> JsonResult<()> {
    if composite == TokenKind::Object {
        parser.skip_object()
    } else {
        parser.skip_array()
    }
}
