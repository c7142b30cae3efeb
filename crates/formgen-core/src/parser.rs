//! Expression text parser
//!
//! Turns `simple_expression` source text from the input AST into fully
//! nested [`Term`] trees. This is the only place that knows operator
//! precedence; the evaluator only ever sees nested expressions.
//!
//! ## Grammar
//!
//! ```text
//! expression := or_expr
//! or_expr    := and_expr (("or" | "||") and_expr)*
//! and_expr   := not_expr (("and" | "&&") not_expr)*
//! not_expr   := ("not" | "!") not_expr | relation
//! relation   := primary (relop primary)?          ; non-associative
//! relop      := "==" | "<>" | "!=" | "<=" | ">=" | "<" | ">"
//! primary    := "(" or_expr ")" | literal | reference
//! literal    := "true" | "false" | number | string
//! reference  := ident ("." ident)*
//! ```

use formgen_types::{Operator, Term, Value, VariableReference};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of, one_of, satisfy},
    combinator::{all_consuming, cut, map, not, opt, peek, recognize, value},
    error::{context, ContextError, ParseError as NomParseError},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

const KEYWORDS: &[&str] = &["and", "or", "not", "true", "false"];

// ============================================================================
// Public API
// ============================================================================

/// Parse one expression from source text
pub fn parse_expression(input: &str) -> Result<Term, String> {
    match all_consuming(delimited(
        multispace0::<_, nom::error::VerboseError<&str>>,
        or_expr,
        multispace0,
    ))(input)
    {
        Ok((_, term)) => Ok(term),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(nom::error::convert_error(input, e))
        }
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

// ============================================================================
// Boolean structure
// ============================================================================

fn or_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Term, E> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace0, alt((tag("||"), keyword("or"))), multispace0)),
        cut(context("operand after 'or'", and_expr)),
    ))(input)?;
    Ok((input, fold_left(Operator::Or, first, rest)))
}

fn and_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Term, E> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace0, alt((tag("&&"), keyword("and"))), multispace0)),
        cut(context("operand after 'and'", not_expr)),
    ))(input)?;
    Ok((input, fold_left(Operator::And, first, rest)))
}

fn not_expr<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Term, E> {
    alt((
        map(
            preceded(
                pair(
                    alt((terminated(tag("!"), not(char('='))), keyword("not"))),
                    multispace0,
                ),
                cut(context("operand after 'not'", not_expr)),
            ),
            |operand| Term::expression(Operator::Not, vec![operand]),
        ),
        relation,
    ))(input)
}

fn fold_left(operator: Operator, first: Term, rest: Vec<Term>) -> Term {
    rest.into_iter()
        .fold(first, |lhs, rhs| Term::expression(operator, vec![lhs, rhs]))
}

// ============================================================================
// Relations
// ============================================================================

fn relation<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Term, E> {
    let (input, lhs) = primary(input)?;
    let (input, rhs) = opt(pair(
        preceded(multispace0, relational_operator),
        preceded(multispace0, cut(context("right-hand side of comparison", primary))),
    ))(input)?;
    let term = match rhs {
        Some((operator, rhs)) => Term::expression(operator, vec![lhs, rhs]),
        None => lhs,
    };
    Ok((input, term))
}

fn relational_operator<'a, E: NomParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Operator, E> {
    // Longer tokens first so "<=" is not read as "<"
    alt((
        value(Operator::Eq, tag("==")),
        value(Operator::Ne, tag("<>")),
        value(Operator::Ne, tag("!=")),
        value(Operator::Le, tag("<=")),
        value(Operator::Ge, tag(">=")),
        value(Operator::Lt, tag("<")),
        value(Operator::Gt, tag(">")),
    ))(input)
}

// ============================================================================
// Primaries
// ============================================================================

fn primary<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Term, E> {
    alt((
        delimited(
            pair(char('('), multispace0),
            or_expr,
            cut(context("closing parenthesis", pair(multispace0, char(')')))),
        ),
        literal,
        map(reference, Term::Reference),
    ))(input)
}

fn literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Term, E> {
    alt((
        value(Term::Literal(Value::Boolean(true)), keyword("true")),
        value(Term::Literal(Value::Boolean(false)), keyword("false")),
        number_literal,
        string_literal,
    ))(input)
}

fn number_literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Term, E> {
    let (remaining, num_str) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let is_real = num_str.contains(['.', 'e', 'E']);
    let parsed = if is_real {
        num_str.parse::<f64>().ok().map(Value::Real)
    } else {
        num_str
            .parse::<i64>()
            .ok()
            .map(Value::Integer)
            .or_else(|| num_str.parse::<f64>().ok().map(Value::Real))
    };
    match parsed {
        Some(v) => Ok((remaining, Term::Literal(v))),
        None => Err(nom::Err::Error(E::from_error_kind(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn string_literal<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Term, E> {
    let (input, s) = delimited(
        char('"'),
        map(
            opt(escaped_transform(
                none_of("\"\\"),
                '\\',
                alt((
                    value('\n', char('n')),
                    value('\r', char('r')),
                    value('\t', char('t')),
                    value('\\', char('\\')),
                    value('"', char('"')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)?;
    Ok((input, Term::Literal(Value::String(s))))
}

fn reference<'a, E: NomParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, VariableReference, E> {
    let (rest, path) = recognize(pair(
        identifier,
        many0(pair(char('.'), identifier)),
    ))(input)?;
    if path.split('.').any(|segment| KEYWORDS.contains(&segment)) {
        return Err(nom::Err::Error(E::from_error_kind(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    // A call like `f(x)` is outside the closed grammar
    if peek(preceded(
        multispace0::<&str, E>,
        char::<&str, E>('('),
    ))(rest)
    .is_ok()
    {
        return Err(nom::Err::Error(E::from_error_kind(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, VariableReference::new(path)))
}

fn identifier<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// A keyword that is not the prefix of a longer identifier
fn keyword<'a, E: NomParseError<&'a str>>(
    word: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    terminated(
        tag(word),
        not(peek(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

// ============================================================================
// Tests
// ============================================================================
