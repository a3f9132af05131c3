use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

/// Accept `"1"` as well as `1`
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

// ESearch API response structures
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ESearchResponse {
    pub esearchresult: ESearchData,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ESearchData {
    #[serde(default, rename = "ERROR")]
    pub error: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub retmax: Option<String>,
    #[serde(default)]
    pub retstart: Option<String>,
    #[serde(default)]
    pub idlist: Vec<String>,
    /// WebEnv session identifier for history server
    #[serde(default)]
    pub webenv: Option<String>,
    /// Query key for history server
    #[serde(default, rename = "querykey")]
    pub query_key: Option<String>,
    /// How the service interpreted and translated the search term
    #[serde(default)]
    pub querytranslation: Option<String>,
}

// EPost API response structures (JSON flavour)
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EPostResponse {
    pub epostresult: EPostData,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EPostData {
    #[serde(default, rename = "ERROR")]
    pub error: Option<String>,
    #[serde(default)]
    pub webenv: Option<String>,
    #[serde(default, rename = "querykey")]
    pub query_key: Option<String>,
}

// EPost API response structures (XML flavour, the service default)
#[derive(Debug, Deserialize)]
#[serde(rename = "ePostResult")]
pub(crate) struct EPostXml {
    #[serde(default, rename = "ERROR")]
    pub error: Option<String>,
    #[serde(default, rename = "WebEnv")]
    pub webenv: Option<String>,
    #[serde(default, rename = "QueryKey")]
    pub query_key: Option<String>,
    #[serde(default, rename = "InvalidIdList")]
    pub invalid_ids: Option<EPostInvalidIds>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EPostInvalidIds {
    #[serde(default, rename = "Id")]
    pub ids: Vec<String>,
}

// ELink API response structures
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkResponse {
    #[serde(default, rename = "ERROR")]
    pub error: Option<String>,
    #[serde(rename = "linksets", default)]
    pub linksets: Vec<ELinkSet>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkSet {
    #[serde(rename = "dbfrom")]
    pub db_from: String,
    #[serde(rename = "ids", default)]
    pub ids: Vec<Value>,
    #[serde(rename = "linksetdbs", default)]
    pub linkset_dbs: Option<Vec<ELinkSetDb>>,
    #[serde(default)]
    pub webenv: Option<String>,
    #[serde(rename = "linksetdbhistories", default)]
    pub linkset_db_histories: Option<Vec<ELinkSetDbHistory>>,
    /// `cmd=acheck`, `ncheck` and `lcheck`
    #[serde(rename = "idchecklist", default)]
    pub id_check_list: Option<ELinkIdCheckList>,
    /// `cmd=llinks`, `llinkslib` and `prlinks`
    #[serde(rename = "idurllist", default)]
    pub id_url_list: Option<ELinkIdUrlList>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkSetDb {
    #[serde(rename = "dbto")]
    pub db_to: String,
    #[serde(rename = "linkname")]
    pub link_name: String,
    #[serde(rename = "links", default)]
    pub links: Vec<ELinkEntry>,
}

/// Plain UIDs for `cmd=neighbor`, scored objects for `cmd=neighbor_score`
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ELinkEntry {
    Id(String),
    Number(u64),
    Scored {
        id: String,
        #[serde(default)]
        score: Option<Value>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkSetDbHistory {
    #[serde(rename = "dbto")]
    pub db_to: String,
    #[serde(rename = "linkname", default)]
    pub link_name: Option<String>,
    #[serde(rename = "querykey", deserialize_with = "string_or_number")]
    pub query_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkIdCheckList {
    #[serde(default)]
    pub ids: Vec<ELinkIdCheck>,
    #[serde(rename = "idlinksets", default)]
    pub id_link_sets: Vec<ELinkIdLinkSet>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkIdCheck {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(rename = "hasneighbor", default)]
    pub has_neighbor: Option<String>,
    #[serde(rename = "haslinkout", default)]
    pub has_linkout: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkIdLinkSet {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "linkinfos", default)]
    pub link_infos: Vec<ELinkInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkInfo {
    #[serde(rename = "dbto")]
    pub db_to: String,
    #[serde(rename = "linkname")]
    pub link_name: String,
    #[serde(rename = "menutag", default)]
    pub menu_tag: Option<String>,
    #[serde(rename = "htmltag", default)]
    pub html_tag: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub priority: Option<String>,
}

/// A bare list of URL sets, or one wrapped in `idurlsets`
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ELinkIdUrlList {
    Sets(Vec<ELinkIdUrlSet>),
    Wrapped {
        #[serde(rename = "idurlsets", default)]
        sets: Vec<ELinkIdUrlSet>,
    },
}

impl ELinkIdUrlList {
    pub fn into_sets(self) -> Vec<ELinkIdUrlSet> {
        match self {
            ELinkIdUrlList::Sets(sets) | ELinkIdUrlList::Wrapped { sets } => sets,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkIdUrlSet {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "objurls", default)]
    pub obj_urls: Vec<ELinkObjUrl>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkObjUrl {
    /// `{"value": "https://..."}` or a plain string
    #[serde(default)]
    pub url: Option<Value>,
    #[serde(rename = "linkname", default)]
    pub link_name: Option<String>,
    #[serde(default)]
    pub provider: Option<ELinkProvider>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ELinkProvider {
    #[serde(default)]
    pub name: Option<String>,
}
