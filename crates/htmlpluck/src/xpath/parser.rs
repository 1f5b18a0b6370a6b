//! Recursive-descent parser producing the expression tree

use super::lexer::{tokenize, Spanned, Token};
use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// Element or attribute name, lowercased
    Name(String),
    /// `*`
    Any,
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn bare(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Last,
    Position,
    Count,
    Contains,
    StartsWith,
    NormalizeSpace,
    String,
    StringLength,
    Concat,
    Substring,
    SubstringBefore,
    SubstringAfter,
    Translate,
    Name,
    LocalName,
    Not,
    Boolean,
    True,
    False,
    Lang,
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "last" => Function::Last,
            "position" => Function::Position,
            "count" => Function::Count,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "normalize-space" => Function::NormalizeSpace,
            "string" => Function::String,
            "string-length" => Function::StringLength,
            "concat" => Function::Concat,
            "substring" => Function::Substring,
            "substring-before" => Function::SubstringBefore,
            "substring-after" => Function::SubstringAfter,
            "translate" => Function::Translate,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            "not" => Function::Not,
            "boolean" => Function::Boolean,
            "true" => Function::True,
            "false" => Function::False,
            "lang" => Function::Lang,
            "number" => Function::Number,
            "sum" => Function::Sum,
            "floor" => Function::Floor,
            "ceiling" => Function::Ceiling,
            "round" => Function::Round,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive
    fn arity(self) -> (usize, usize) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, 0),
            Function::Count
            | Function::Not
            | Function::Boolean
            | Function::Lang
            | Function::Sum
            | Function::Floor
            | Function::Ceiling
            | Function::Round => (1, 1),
            Function::Contains
            | Function::StartsWith
            | Function::SubstringBefore
            | Function::SubstringAfter => (2, 2),
            Function::Substring => (2, 3),
            Function::Translate => (3, 3),
            Function::NormalizeSpace
            | Function::String
            | Function::StringLength
            | Function::Name
            | Function::LocalName
            | Function::Number => (0, 1),
            Function::Concat => (2, usize::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// Location path; absolute paths start at the document root
    Path { absolute: bool, steps: Vec<Step> },
    /// Primary expression filtered by predicates, optionally continued by steps
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Union(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
}

/// Deepest expression tree accepted; evaluation recurses once per level
const MAX_DEPTH: usize = 128;

struct Parser<'e> {
    expression: &'e str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

/// Parse `expression` into an expression tree
pub(crate) fn parse(expression: &str) -> Result<Expr, ExtractError> {
    if expression.trim().is_empty() {
        return Err(ExtractError::EmptyExpression);
    }

    let mut parser = Parser {
        expression,
        tokens: tokenize(expression)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected token"));
    }
    Ok(expr)
}

impl<'e> Parser<'e> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExtractError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn error(&self, message: &str) -> ExtractError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.expression.len());
        ExtractError::Syntax {
            expression: self.expression.to_string(),
            offset,
            message: message.to_string(),
        }
    }

    /// Count one more level of tree depth
    ///
    /// Every nested sub-expression and every operator in a chain adds a
    /// level; callers restore the depth they started at once they return.
    fn descend(&mut self) -> Result<(), ExtractError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        self.descend()?;
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            self.descend()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_equality()?;
        while self.eat_keyword("and") {
            self.descend()?;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let build: fn(Box<Expr>, Box<Expr>) -> Expr = if self.eat(&Token::Plus) {
                Expr::Add
            } else if self.eat(&Token::Minus) {
                Expr::Sub
            } else {
                break;
            };
            self.descend()?;
            let right = self.parse_multiplicative()?;
            left = build(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    /// `*`, `div` and `mod` are operators here because a complete operand
    /// precedes them
    fn parse_multiplicative(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let build: fn(Box<Expr>, Box<Expr>) -> Expr = if self.eat(&Token::Star) {
                Expr::Mul
            } else if self.eat_keyword("div") {
                Expr::Div
            } else if self.eat_keyword("mod") {
                Expr::Mod
            } else {
                break;
            };
            self.descend()?;
            let right = self.parse_unary()?;
            left = build(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExtractError> {
        if self.eat(&Token::Minus) {
            let mark = self.depth;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth = mark;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, ExtractError> {
        let mark = self.depth;
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            self.descend()?;
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen)
                    && !matches!(name.as_str(), "node" | "text" | "comment")
            }
            _ => false,
        }
    }

    fn parse_path(&mut self) -> Result<Expr, ExtractError> {
        if self.eat(&Token::Slash) {
            let steps = if self.starts_step() {
                self.parse_relative()?
            } else {
                Vec::new()
            };
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }

        if self.eat(&Token::DoubleSlash) {
            let mut steps = vec![Step::bare(Axis::DescendantOrSelf, NodeTest::Node)];
            steps.extend(self.parse_relative()?);
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }

        if self.starts_primary() {
            let primary = self.parse_primary()?;
            let predicates = self.parse_predicates()?;
            let mut steps = Vec::new();
            if self.eat(&Token::Slash) {
                steps = self.parse_relative()?;
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::bare(Axis::DescendantOrSelf, NodeTest::Node));
                steps.extend(self.parse_relative()?);
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }

        if self.starts_step() {
            return Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative()?,
            });
        }

        Err(self.error("expected expression"))
    }

    fn parse_relative(&mut self) -> Result<Vec<Step>, ExtractError> {
        let mut steps = vec![self.parse_step()?];
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::bare(Axis::DescendantOrSelf, NodeTest::Node));
                steps.push(self.parse_step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step, ExtractError> {
        if self.eat(&Token::Dot) {
            return Ok(Step::bare(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::bare(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(&format!("unknown axis {:?}", name)))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, ExtractError> {
        if self.eat(&Token::Star) {
            return Ok(NodeTest::Any);
        }

        let name = match self.peek() {
            Some(Token::Name(name)) => name.clone(),
            _ => return Err(self.error("expected node test")),
        };
        self.pos += 1;

        if self.peek() == Some(&Token::LParen) {
            let test = match name.as_str() {
                "node" => NodeTest::Node,
                "text" => NodeTest::Text,
                "comment" => NodeTest::Comment,
                _ => return Err(self.error(&format!("unknown node type {:?}", name))),
            };
            self.pos += 1;
            self.expect(&Token::RParen, "')'")?;
            return Ok(test);
        }

        Ok(NodeTest::Name(name.to_lowercase()))
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, ExtractError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExtractError> {
        match self.bump() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                self.pos -= 1;
                let function = Function::from_name(&name)
                    .ok_or_else(|| self.error(&format!("unknown function {:?}", name)))?;
                self.pos += 2;

                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen, "')' or ','")?;
                        break;
                    }
                }

                let (min, max) = function.arity();
                if args.len() < min || args.len() > max {
                    return Err(ExtractError::Evaluation(format!(
                        "function {}() called with {} argument(s)",
                        name,
                        args.len()
                    )));
                }
                Ok(Expr::Call(function, args))
            }
            _ => Err(self.error("expected primary expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> NodeTest {
        NodeTest::Name(n.to_string())
    }

    #[test]
    fn test_parse_descendant_path() {
        let expr = parse("//ul/li").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: true,
                steps: vec![
                    Step::bare(Axis::DescendantOrSelf, NodeTest::Node),
                    Step::bare(Axis::Child, name("ul")),
                    Step::bare(Axis::Child, name("li")),
                ],
            }
        );
    }

    #[test]
    fn test_parse_lowercases_name_tests() {
        let expr = parse("/HTML/Body").unwrap();
        assert_eq!(
            expr,
            Expr::Path {
                absolute: true,
                steps: vec![
                    Step::bare(Axis::Child, name("html")),
                    Step::bare(Axis::Child, name("body")),
                ],
            }
        );
    }

    #[test]
    fn test_parse_predicates_and_axes() {
        let expr = parse("//div[@class='a'][2]/following-sibling::p").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].predicates.len(), 2);
        assert_eq!(
            steps[1].predicates[0],
            Expr::Compare(
                CmpOp::Eq,
                Box::new(Expr::Path {
                    absolute: false,
                    steps: vec![Step::bare(Axis::Attribute, name("class"))],
                }),
                Box::new(Expr::Literal("a".to_string())),
            )
        );
        assert_eq!(steps[1].predicates[1], Expr::Number(2.0));
        assert_eq!(steps[2].axis, Axis::FollowingSibling);
    }

    #[test]
    fn test_parse_function_and_filter() {
        let expr = parse("(//li)[last()]").unwrap();
        assert!(matches!(expr, Expr::Filter { ref predicates, .. } if predicates.len() == 1));

        let expr = parse("count(//li)").unwrap();
        assert!(matches!(expr, Expr::Call(Function::Count, ref args) if args.len() == 1));
    }

    #[test]
    fn test_parse_union_and_boolean() {
        assert!(matches!(parse("//a | //b").unwrap(), Expr::Union(..)));
        let expr = parse("//li[text()='x' or contains(@id, 'y') and not(@hidden)]").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert!(matches!(steps[1].predicates[0], Expr::Or(..)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(""), Err(ExtractError::EmptyExpression));
        assert_eq!(parse("   "), Err(ExtractError::EmptyExpression));
        assert!(matches!(parse("//ul/"), Err(ExtractError::Syntax { .. })));
        assert!(matches!(parse("//li["), Err(ExtractError::Syntax { .. })));
        assert!(matches!(parse("//li]"), Err(ExtractError::Syntax { .. })));
        assert!(matches!(parse("bogus::li"), Err(ExtractError::Syntax { .. })));
        assert!(matches!(parse("frobnicate()"), Err(ExtractError::Syntax { .. })));
        assert!(matches!(parse("contains('a')"), Err(ExtractError::Evaluation(_))));
        assert!(matches!(parse("translate('a', 'b')"), Err(ExtractError::Evaluation(_))));
    }

    #[test]
    fn test_parse_multiplicative() {
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Add(_, right) = expr else {
            panic!("expected addition");
        };
        assert!(matches!(*right, Expr::Mul(..)));

        assert!(matches!(parse("6 div 2").unwrap(), Expr::Div(..)));
        assert!(matches!(parse("7 mod 2").unwrap(), Expr::Mod(..)));

        let expr = parse("//li[position() mod 2 = 0]").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert!(matches!(steps[1].predicates[0], Expr::Compare(CmpOp::Eq, ..)));
    }

    #[test]
    fn test_parse_star_and_names_stay_tests() {
        let expr = parse("//div/*").unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("expected path");
        };
        assert_eq!(steps.len(), 3);
        assert!(matches!(parse("//mod/div").unwrap(), Expr::Path { .. }));
    }

    #[test]
    fn test_parse_string_functions() {
        for expression in [
            "substring('abc', 2)",
            "substring('abc', 1, 2)",
            "substring-before('a/b', '/')",
            "substring-after('a/b', '/')",
            "translate('abc', 'ab', 'AB')",
            "sum(//li)",
            "floor(1.5)",
            "ceiling(1.5)",
            "round(1.5)",
            "lang('en')",
        ] {
            assert!(matches!(parse(expression).unwrap(), Expr::Call(..)), "{}", expression);
        }
    }

    #[test]
    fn test_parse_rejects_deep_nesting() {
        let nested = format!("{}//a{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(parse(&nested), Err(ExtractError::Syntax { .. })));

        let chain = vec!["//a"; 1_000].join(" or ");
        assert!(matches!(parse(&chain), Err(ExtractError::Syntax { .. })));

        let negated = format!("{}1", "-".repeat(10_000));
        assert!(matches!(parse(&negated), Err(ExtractError::Syntax { .. })));

        let predicates = format!("{}{}", "//a[b".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(parse(&predicates), Err(ExtractError::Syntax { .. })));
    }

    #[test]
    fn test_parse_accepts_moderate_nesting() {
        let nested = format!("{}//a{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&nested).is_ok());

        let chain = vec!["//a"; 50].join(" or ");
        assert!(parse(&chain).is_ok());
    }
}
