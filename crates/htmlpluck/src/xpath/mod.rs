//! XPath 1.0 subset over HTML documents
//!
//! Supports location paths with the common axes, `*`/`node()`/`text()`/
//! `comment()` tests, predicates with comparison, arithmetic and boolean
//! operators, unions, and the core string, number and node-set functions.
//! Expressions nested deeper than a fixed limit are rejected at compile time.

mod dom;
mod eval;
mod lexer;
mod parser;

use crate::error::ExtractError;
use dom::Dom;
use eval::Evaluator;
use parser::Expr;
use scraper::Html;

/// A compiled XPath expression
#[derive(Debug, Clone)]
pub struct XPath {
    expression: String,
    expr: Expr,
}

impl XPath {
    /// Compile `expression`
    pub fn compile(expression: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            expression: expression.to_string(),
            expr: parser::parse(expression)?,
        })
    }

    /// Source text of the expression
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Parse `html` as a document and serialize every matching node
    pub fn select(&self, html: &str) -> Result<Vec<String>, ExtractError> {
        let document = Html::parse_document(html);
        let dom = Dom::build(&document);
        let nodes = Evaluator::new(&dom).select(&self.expr)?;
        Ok(nodes.into_iter().map(|id| dom.render(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<ul>
        <li>Tag attributes</li>
        <li>Make plain text</li>
    </ul>"#;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Shop</title></head>
<body>
    <div id="main" class="content">
        <h1>Items</h1>
        <ul class="items">
            <li data-price="10">Apple</li>
            <li data-price="25" class="sale">Pear &amp; Quince</li>
            <li data-price="5">Plum</li>
        </ul>
        <p>First <a href="/a?x=1&amp;y=2">link</a></p>
        <!-- footer -->
        <p>Second</p>
    </div>
</body>
</html>"#;

    fn select(expression: &str, html: &str) -> Vec<String> {
        XPath::compile(expression).unwrap().select(html).unwrap()
    }

    #[test]
    fn test_select_list_items() {
        assert_eq!(
            select("//ul/li", LIST),
            vec!["<li>Tag attributes</li>", "<li>Make plain text</li>"]
        );
    }

    #[test]
    fn test_select_no_match_is_empty() {
        assert!(select("//table", LIST).is_empty());
    }

    #[test]
    fn test_select_absolute_path() {
        assert_eq!(select("/html/head/title", PAGE), vec!["<title>Shop</title>"]);
        assert_eq!(select("/HTML/HEAD/TITLE/text()", PAGE), vec!["Shop"]);
    }

    #[test]
    fn test_select_unescapes_entities() {
        assert_eq!(select("//li[@class='sale']/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(
            select("//p/a", PAGE),
            vec![r#"<a href="/a?x=1&y=2">link</a>"#]
        );
        assert_eq!(select("//a/@href", PAGE), vec!["<href>/a?x=1&y=2</href>"]);
    }

    #[test]
    fn test_select_positional_predicates() {
        assert_eq!(select("//li[1]/text()", PAGE), vec!["Apple"]);
        assert_eq!(select("//li[last()]/text()", PAGE), vec!["Plum"]);
        assert_eq!(select("//li[position() > 1]", PAGE).len(), 2);
        assert_eq!(select("(//p)[2]", PAGE), vec!["<p>Second</p>"]);
        assert_eq!(select("//li[last()-1]/text()", PAGE), vec!["Pear & Quince"]);
    }

    #[test]
    fn test_select_comparisons_and_functions() {
        assert_eq!(select("//li[@data-price > 8]/text()", PAGE), vec!["Apple", "Pear & Quince"]);
        assert_eq!(select("//li[contains(., 'Pl')]/text()", PAGE), vec!["Plum"]);
        assert_eq!(select("//li[starts-with(text(), 'Ap')]/text()", PAGE), vec!["Apple"]);
        assert_eq!(select("//li[not(@class)]/text()", PAGE), vec!["Apple", "Plum"]);
        assert_eq!(
            select("//div[@id='main' and contains(@class, 'content')]/h1", PAGE),
            vec!["<h1>Items</h1>"]
        );
        assert_eq!(
            select("//p[normalize-space(.)='First link']/a/text()", PAGE),
            vec!["link"]
        );
        assert_eq!(select("//ul[count(li) = 3]/@class", PAGE), vec!["<class>items</class>"]);
    }

    #[test]
    fn test_select_arithmetic() {
        assert_eq!(select("//li[position() mod 2 = 0]/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(select("//li[position() * 2 = 4]/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(select("//li[position() div 2 = 1]/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(select("//li[@data-price * 2 = 50]/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(
            select("//li[@data-price mod 5 = 0 and @data-price div 5 > 1]", PAGE).len(),
            2
        );
        assert_eq!(
            select("//ul[sum(li/@data-price) = 40]/@class", PAGE),
            vec!["<class>items</class>"]
        );
    }

    #[test]
    fn test_select_string_and_number_functions() {
        assert_eq!(select("//li[substring(., 2, 3) = 'ppl']/text()", PAGE), vec!["Apple"]);
        assert_eq!(select("//li[substring(., 4) = 'm']/text()", PAGE), vec!["Plum"]);
        assert_eq!(
            select("//li[substring-before(., ' &') = 'Pear']/text()", PAGE),
            vec!["Pear & Quince"]
        );
        assert_eq!(
            select("//li[substring-after(., '& ') = 'Quince']/text()", PAGE),
            vec!["Pear & Quince"]
        );
        assert_eq!(
            select("//li[translate(., 'APLE', 'aple') = 'apple']/text()", PAGE),
            vec!["Apple"]
        );
        assert_eq!(
            select("//li[floor(@data-price div 10) = 2]/text()", PAGE),
            vec!["Pear & Quince"]
        );
        assert_eq!(
            select("//li[ceiling(@data-price div 10) = 1]/text()", PAGE),
            vec!["Apple", "Plum"]
        );
        assert_eq!(
            select("//li[round(@data-price div 10) = 3]/text()", PAGE),
            vec!["Pear & Quince"]
        );
    }

    #[test]
    fn test_select_lang() {
        let html = r#"<div lang="en-GB"><p>Colour</p></div><div lang="fr"><p>Couleur</p></div>"#;
        assert_eq!(select("//p[lang('en')]/text()", html), vec!["Colour"]);
        assert_eq!(select("//p[lang('FR')]/text()", html), vec!["Couleur"]);
        assert!(select("//p[lang('de')]", html).is_empty());
    }

    #[test]
    fn test_select_attributes_in_source_order() {
        let html = r#"<a id="x" href="/y" class="z" title="t" rel="r">k</a>"#;
        assert_eq!(
            select("//a/@*", html),
            vec![
                "<id>x</id>",
                "<href>/y</href>",
                "<class>z</class>",
                "<title>t</title>",
                "<rel>r</rel>",
            ]
        );
    }

    #[test]
    fn test_select_void_elements() {
        assert_eq!(select("//p", "<p>one<br>two</p>"), vec!["<p>one<br/>two</p>"]);
        assert_eq!(select("//br", "<p>one<br>two</p>"), vec!["<br/>"]);
    }

    #[test]
    fn test_compile_rejects_deep_nesting() {
        let nested = format!("{}//li{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            XPath::compile(&nested).unwrap_err(),
            ExtractError::Syntax { .. }
        ));
    }

    #[test]
    fn test_select_axes() {
        assert_eq!(
            select("//h1/following-sibling::ul/@class", PAGE),
            vec!["<class>items</class>"]
        );
        assert_eq!(select("//li[2]/preceding-sibling::li/text()", PAGE), vec!["Apple"]);
        assert_eq!(select("//li[3]/preceding-sibling::li[1]/text()", PAGE), vec!["Pear & Quince"]);
        assert_eq!(select("//a/ancestor::div/@id", PAGE), vec!["<id>main</id>"]);
        assert_eq!(select("//a/../../h1/text()", PAGE), vec!["Items"]);
        assert_eq!(select("//li[1]/self::li/text()", PAGE), vec!["Apple"]);
        assert_eq!(select("//ul/descendant::li", PAGE).len(), 3);
    }

    #[test]
    fn test_select_union_in_document_order() {
        assert_eq!(
            select("//p[2] | //h1", PAGE),
            vec!["<h1>Items</h1>", "<p>Second</p>"]
        );
    }

    #[test]
    fn test_select_comments() {
        assert_eq!(select("//div/comment()", PAGE), vec!["<!-- footer -->"]);
    }

    #[test]
    fn test_select_deduplicates() {
        assert_eq!(select("//li/..", PAGE).len(), 1);
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(XPath::compile("").unwrap_err(), ExtractError::EmptyExpression);
        assert!(matches!(
            XPath::compile("//ul/li[").unwrap_err(),
            ExtractError::Syntax { .. }
        ));
    }

    #[test]
    fn test_non_node_set_result() {
        let xpath = XPath::compile("count(//li)").unwrap();
        assert_eq!(xpath.select(PAGE).unwrap_err(), ExtractError::NotNodeSet);
    }
}
