use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{Map, Value};

use super::blocks::collapse_whitespace;

static JSON_LD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static ITEMSCOPE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[itemscope][itemtype]").unwrap());
static ITEMPROP_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[itemprop]").unwrap());

const SCHEMA_PREFIXES: &[&str] = &["https://schema.org/", "http://schema.org/", "schema:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuredFormat {
    JsonLd,
    Microdata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredEntry {
    pub types: Vec<String>,
    pub fields: Map<String, Value>,
    pub format: StructuredFormat,
    /// Index of the source block (JSON-LD blocks first, then microdata roots).
    pub block: usize,
}

impl StructuredEntry {
    pub fn has_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t.eq_ignore_ascii_case(ty))
    }

    /// A field is present when it holds something other than null, an empty
    /// string or an empty collection.
    pub fn has_field(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

/// A structured-data block that could not be used. Not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionWarning {
    pub block: usize,
    pub message: String,
}

pub fn extract(doc: &Html) -> (Vec<StructuredEntry>, Vec<ExtractionWarning>) {
    let mut entries = Vec::new();
    let mut warnings = Vec::new();

    let mut block = 0;
    for script in doc.select(&JSON_LD_SEL) {
        let raw = script.text().collect::<String>();
        parse_json_ld(block, raw.trim(), &mut entries, &mut warnings);
        block += 1;
    }

    for root in doc.select(&ITEMSCOPE_SEL).filter(|el| !has_itemscope_ancestor(*el)) {
        entries.push(microdata_entry(block, root));
        block += 1;
    }

    (entries, warnings)
}

fn parse_json_ld(
    block: usize,
    raw: &str,
    entries: &mut Vec<StructuredEntry>,
    warnings: &mut Vec<ExtractionWarning>,
) {
    if raw.is_empty() {
        warnings.push(ExtractionWarning {
            block,
            message: "empty JSON-LD block".to_string(),
        });
        return;
    }

    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warnings.push(ExtractionWarning {
                block,
                message: format!("malformed JSON-LD: {}", e),
            });
            return;
        }
    };

    let mut nodes = Vec::new();
    flatten(&value, &mut nodes);
    if nodes.is_empty() {
        warnings.push(ExtractionWarning {
            block,
            message: "JSON-LD block contains no objects".to_string(),
        });
    }

    for node in nodes {
        let types = node_types(node);
        if types.is_empty() {
            warnings.push(ExtractionWarning {
                block,
                message: "JSON-LD entry without @type".to_string(),
            });
            continue;
        }
        let fields = node
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "@context" | "@type" | "@graph"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.push(StructuredEntry {
            types,
            fields,
            format: StructuredFormat::JsonLd,
            block,
        });
    }
}

/// Top-level objects, array members and `@graph` members.
fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| flatten(v, out)),
        Value::Object(obj) => {
            if let Some(graph) = obj.get("@graph") {
                flatten(graph, out);
                if obj.contains_key("@type") {
                    out.push(obj);
                }
            } else {
                out.push(obj);
            }
        }
        _ => {}
    }
}

fn node_types(node: &Map<String, Value>) -> Vec<String> {
    let raw: Vec<&str> = match node.get("@type") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(a)) => a.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    raw.into_iter().map(strip_vocab).filter(|t| !t.is_empty()).collect()
}

fn strip_vocab(ty: &str) -> String {
    let ty = ty.trim();
    SCHEMA_PREFIXES
        .iter()
        .find_map(|p| ty.strip_prefix(p))
        .unwrap_or(ty)
        .to_string()
}

fn has_itemscope_ancestor(el: ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().attr("itemscope").is_some())
}

fn microdata_entry(block: usize, root: ElementRef) -> StructuredEntry {
    let types = root
        .value()
        .attr("itemtype")
        .unwrap_or_default()
        .split_whitespace()
        .map(|t| t.rsplit('/').next().unwrap_or(t).to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut fields = Map::new();
    for prop in root.select(&ITEMPROP_SEL) {
        let v = prop.value();
        let Some(name) = v.attr("itemprop") else { continue };
        let value = v
            .attr("content")
            .or_else(|| v.attr("href"))
            .or_else(|| v.attr("src"))
            .or_else(|| v.attr("datetime"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| collapse_whitespace(&prop.text().collect::<String>()));
        fields
            .entry(name.trim().to_string())
            .or_insert(Value::String(value));
    }

    StructuredEntry {
        types,
        fields,
        format: StructuredFormat::Microdata,
        block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> (Vec<StructuredEntry>, Vec<ExtractionWarning>) {
        extract(&Html::parse_document(html))
    }

    #[test]
    fn parses_each_block_independently() {
        let (entries, warnings) = run(
            r#"<head>
            <script type="application/ld+json">{"@context":"https://schema.org","@type":"Organization","name":"Acme","url":"https://acme.test"}</script>
            <script type="application/ld+json">{ "@type": "Article", broken</script>
            <script type="application/ld+json">[{"@type":"https://schema.org/WebSite","name":"Acme"}]</script>
            </head>"#,
        );
        assert_eq!(entries.len(), 2);
        assert!(entries[0].has_type("Organization"));
        assert!(entries[0].has_field("name"));
        assert!(!entries[0].fields.contains_key("@context"));
        assert_eq!(entries[1].types, vec!["WebSite".to_string()]);
        assert_eq!(entries[1].block, 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].block, 1);
    }

    #[test]
    fn graph_members_flattened() {
        let (entries, warnings) = run(
            r#"<script type="application/ld+json">{"@context":"https://schema.org","@graph":[
                {"@type":"WebPage","name":"Home"},{"@type":["Organization","Brand"],"name":"Acme"},{"name":"no type"}]}</script>"#,
        );
        assert_eq!(entries.len(), 2);
        assert!(entries[1].has_type("brand"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn microdata_roots() {
        let (entries, _) = run(
            r#"<div itemscope itemtype="https://schema.org/Product">
                <span itemprop="name">Widget</span>
                <div itemprop="offers" itemscope itemtype="https://schema.org/Offer">
                  <meta itemprop="price" content="9.99"></div>
              </div>"#,
        );
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_type("Product"));
        assert_eq!(entries[0].fields.get("name"), Some(&Value::String("Widget".into())));
        assert_eq!(entries[0].format, StructuredFormat::Microdata);
    }

    #[test]
    fn empty_field_not_present() {
        let (entries, _) = run(
            r#"<script type="application/ld+json">{"@type":"Person","name":"  ","sameAs":[]}</script>"#,
        );
        assert!(!entries[0].has_field("name"));
        assert!(!entries[0].has_field("sameAs"));
    }
}
