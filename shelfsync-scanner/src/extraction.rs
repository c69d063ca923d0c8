// Extraction service contract and the raw records it returns
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePurpose {
    ProductDetail,
    CategoryListing,
    CategoryTree,
}

impl PagePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PagePurpose::ProductDetail => "product_detail",
            PagePurpose::CategoryListing => "category_listing",
            PagePurpose::CategoryTree => "category_tree",
        }
    }
}

impl fmt::Display for PagePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product link seen on a listing page. Every field is as reported; nothing
/// is normalized here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub name: Option<String>,
    pub url: Option<String>,
    pub sku: Option<String>,
    /// Either a number or a formatted string such as `"1 299,00 грн"`.
    pub price: Option<Value>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCategory {
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// Classification reported by the service, possibly absent or bogus.
    pub page_type: Option<String>,
    pub products: Vec<RawProduct>,
    pub categories: Vec<RawCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTreeNode {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub children: Vec<RawTreeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub price: Option<Value>,
    pub availability: Option<String>,
    pub category_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Listing(RawListing),
    Tree(Vec<RawTreeNode>),
    Detail(ProductDetail),
}

impl Extracted {
    pub fn kind(&self) -> &'static str {
        match self {
            Extracted::Listing(_) => "category listing",
            Extracted::Tree(_) => "category tree",
            Extracted::Detail(_) => "product detail",
        }
    }

    /// Interpret a service response for the given purpose.
    pub fn from_response(purpose: PagePurpose, value: Value) -> Result<Self> {
        match purpose {
            PagePurpose::CategoryListing => RawListing::from_value(&value).map(Extracted::Listing),
            PagePurpose::CategoryTree => RawTreeNode::list_from_value(&value).map(Extracted::Tree),
            PagePurpose::ProductDetail => ProductDetail::from_value(&value).map(Extracted::Detail),
        }
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ScanError::Extraction(format!("{} response is not a JSON object", what)))
}

/// Strings are trimmed, numbers are stringified, blanks and other types
/// become `None`.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str, what: &str) -> Result<&'a [Value]> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ScanError::Extraction(format!(
            "{}: field '{}' is not a list",
            what, key
        ))),
    }
}

fn price_field(obj: &Map<String, Value>) -> Option<Value> {
    match obj.get("price")? {
        Value::Null => None,
        v @ (Value::Number(_) | Value::String(_)) => Some(v.clone()),
        _ => None,
    }
}

impl RawProduct {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            name: text_field(obj, "name"),
            url: text_field(obj, "url"),
            sku: text_field(obj, "sku"),
            price: price_field(obj),
            availability: text_field(obj, "availability"),
        }
    }
}

impl RawListing {
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = as_object(value, "category listing")?;

        let products = array_field(obj, "products", "category listing")?
            .iter()
            .filter_map(Value::as_object)
            .map(RawProduct::from_object)
            .collect();

        let categories = array_field(obj, "categories", "category listing")?
            .iter()
            .filter_map(Value::as_object)
            .map(|c| RawCategory {
                name: text_field(c, "name"),
                url: text_field(c, "url"),
            })
            .collect();

        Ok(Self {
            page_type: text_field(obj, "page_type"),
            products,
            categories,
        })
    }
}

impl RawTreeNode {
    fn from_object(obj: &Map<String, Value>) -> Result<Self> {
        let children = array_field(obj, "children", "category tree")?
            .iter()
            .filter_map(Value::as_object)
            .map(RawTreeNode::from_object)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: text_field(obj, "id"),
            name: text_field(obj, "name"),
            url: text_field(obj, "url"),
            children,
        })
    }

    /// Accepts either `{"categories": [...]}` or a bare list of nodes.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>> {
        let items: &[Value] = match value {
            Value::Array(items) => items,
            Value::Object(obj) => array_field(obj, "categories", "category tree")?,
            _ => {
                return Err(ScanError::Extraction(
                    "category tree response is neither a list nor an object".to_string(),
                ));
            }
        };
        items
            .iter()
            .filter_map(Value::as_object)
            .map(RawTreeNode::from_object)
            .collect()
    }
}

impl ProductDetail {
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = as_object(value, "product detail")?;
        let category_path = array_field(obj, "category_path", "product detail")?
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            name: text_field(obj, "name"),
            sku: text_field(obj, "sku"),
            price: price_field(obj),
            availability: text_field(obj, "availability"),
            category_path,
        })
    }
}

/// Turns a page into structured records.
///
/// Implementations fetch the page themselves, so a vanished page surfaces as
/// [`ScanError::NotFound`] and unusable output as [`ScanError::Extraction`].
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, url: &str, purpose: PagePurpose) -> Result<Extracted>;

    async fn extract_listing(&self, url: &str) -> Result<RawListing> {
        match self.extract(url, PagePurpose::CategoryListing).await? {
            Extracted::Listing(listing) => Ok(listing),
            other => Err(unexpected(PagePurpose::CategoryListing, &other)),
        }
    }

    async fn extract_tree(&self, url: &str) -> Result<Vec<RawTreeNode>> {
        match self.extract(url, PagePurpose::CategoryTree).await? {
            Extracted::Tree(nodes) => Ok(nodes),
            other => Err(unexpected(PagePurpose::CategoryTree, &other)),
        }
    }

    async fn extract_detail(&self, url: &str) -> Result<ProductDetail> {
        match self.extract(url, PagePurpose::ProductDetail).await? {
            Extracted::Detail(detail) => Ok(detail),
            other => Err(unexpected(PagePurpose::ProductDetail, &other)),
        }
    }
}

fn unexpected(purpose: PagePurpose, got: &Extracted) -> ScanError {
    ScanError::Extraction(format!("asked for {}, got {}", purpose, got.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_purpose_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(PagePurpose::CategoryListing).unwrap(),
            json!("category_listing")
        );
        assert_eq!(PagePurpose::ProductDetail.to_string(), "product_detail");
    }

    #[test]
    fn test_listing_is_lenient() {
        let value = json!({
            "page_type": "product_list",
            "products": [
                {"name": "  Phone  ", "url": "/p/1", "price": "1 299 грн", "sku": 12345},
                "garbage",
                {"name": "", "url": "/p/2", "price": {"amount": 5}}
            ],
            "categories": null
        });
        let listing = RawListing::from_value(&value).unwrap();
        assert_eq!(listing.page_type.as_deref(), Some("product_list"));
        assert_eq!(listing.products.len(), 2);
        assert_eq!(listing.products[0].name.as_deref(), Some("Phone"));
        assert_eq!(listing.products[0].sku.as_deref(), Some("12345"));
        assert_eq!(listing.products[0].price, Some(json!("1 299 грн")));
        assert_eq!(listing.products[1].name, None);
        assert_eq!(listing.products[1].price, None);
        assert!(listing.categories.is_empty());
    }

    #[test]
    fn test_listing_rejects_wrong_shapes() {
        assert!(RawListing::from_value(&json!("just text")).is_err());
        let err = RawListing::from_value(&json!({"products": "nope"})).unwrap_err();
        assert!(matches!(err, ScanError::Extraction(_)));
    }

    #[test]
    fn test_tree_accepts_both_shapes() {
        let nested = json!({
            "categories": [
                {"id": "phones", "name": "Phones", "url": "/phones",
                 "children": [{"name": "Android", "url": "/phones/android"}]}
            ]
        });
        let nodes = RawTreeNode::list_from_value(&nested).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].children.len(), 1);
        assert_eq!(nodes[0].children[0].id, None);

        let bare = json!([{"name": "TV", "url": "/tv"}]);
        assert_eq!(RawTreeNode::list_from_value(&bare).unwrap().len(), 1);
    }

    #[test]
    fn test_detail_category_path() {
        let value = json!({
            "name": "Phone",
            "price": 1299.5,
            "availability": "in stock",
            "category_path": ["Electronics", " ", "Phones"]
        });
        let detail = ProductDetail::from_value(&value).unwrap();
        assert_eq!(detail.category_path, vec!["Electronics", "Phones"]);
        assert_eq!(detail.price, Some(json!(1299.5)));
    }

    #[test]
    fn test_from_response_dispatches_on_purpose() {
        let value = json!({"products": [], "categories": []});
        let extracted = Extracted::from_response(PagePurpose::CategoryListing, value).unwrap();
        assert_eq!(extracted.kind(), "category listing");
    }
}
