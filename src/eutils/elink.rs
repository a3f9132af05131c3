//! ELink: related records across databases

use serde::Serialize;
use serde_json::Value;

use super::responses::{
    ELinkEntry, ELinkIdCheckList, ELinkIdUrlSet, ELinkInfo, ELinkObjUrl, ELinkResponse, ELinkSet,
};
use super::{check_service_error, require};
use crate::analyzer::{Analyzer, EutilsResult};
use crate::error::{EutilsError, Result};
use crate::query::{Discovery, Page, RequestBuilder};
use crate::request::{Eutil, HistorySession, Method, Parameters, Request};

/// Id lists longer than this are sent as a POST body
pub const ELINK_POST_THRESHOLD: usize = 200;

/// Commands returning linked UIDs; these need a target `db`
const NEIGHBOR_COMMANDS: &[&str] = &["neighbor", "neighbor_score", "neighbor_history"];

/// Commands checking link availability or listing LinkOut URLs
const CHECK_COMMANDS: &[&str] = &["acheck", "ncheck", "lcheck", "llinks", "llinkslib", "prlinks"];

/// Request builder for elink
#[derive(Debug, Clone, Copy, Default)]
pub struct Elink;

impl RequestBuilder for Elink {
    fn eutil(&self) -> Eutil {
        Eutil::ELink
    }

    fn method(&self, request: &Parameters) -> Method {
        if request.ids().len() > ELINK_POST_THRESHOLD {
            Method::Post
        } else {
            Method::Get
        }
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        let command = parameters.get("cmd").map(str::trim).unwrap_or("neighbor");
        if NEIGHBOR_COMMANDS.contains(&command) {
            require(parameters, "db", Eutil::ELink)?;
        } else if !CHECK_COMMANDS.contains(&command) {
            return Err(EutilsError::ConfigurationError(format!(
                "unknown elink command: {command}"
            )));
        }
        require(parameters, "dbfrom", Eutil::ELink)?;
        let session = parameters.history_session()?;
        if session.is_none() && parameters.ids().is_empty() {
            return Err(EutilsError::ConfigurationError(
                "elink requires `id` or a WebEnv / query_key pair".to_string(),
            ));
        }
        Ok(())
    }

    fn build(
        &self,
        parameters: &Parameters,
        _pages: Option<&[Page]>,
        _discovery: Option<&Discovery>,
    ) -> Result<Vec<Parameters>> {
        let mut wire = parameters.to_request_parameters();
        wire.set("retmode", "json");
        Ok(vec![wire])
    }
}

/// One linked record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub id: String,
    /// Similarity score, for `cmd=neighbor_score`
    pub score: Option<String>,
}

/// Links from a source set into one target database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkList {
    pub db_to: String,
    pub link_name: String,
    pub links: Vec<Link>,
}

/// Link results stored on the history server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkHistory {
    pub db_to: String,
    pub link_name: Option<String>,
    pub query_key: String,
}

/// A link available for a UID, as listed by `cmd=acheck`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkInfo {
    pub db_to: String,
    pub link_name: String,
    pub menu_tag: Option<String>,
    pub html_tag: Option<String>,
    pub priority: Option<String>,
}

/// Link availability of one source UID (`acheck`, `ncheck`, `lcheck`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdCheck {
    pub id: String,
    /// Answer of `cmd=ncheck`
    pub has_neighbor: Option<bool>,
    /// Answer of `cmd=lcheck`
    pub has_linkout: Option<bool>,
    pub link_infos: Vec<LinkInfo>,
}

impl IdCheck {
    fn size(&self) -> usize {
        self.link_infos.len()
            + usize::from(self.has_neighbor.is_some())
            + usize::from(self.has_linkout.is_some())
    }
}

/// A LinkOut URL (`llinks`, `llinkslib`, `prlinks`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkOut {
    pub url: String,
    pub link_name: Option<String>,
    pub provider: Option<String>,
}

/// LinkOut URLs of one source UID
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdUrls {
    pub id: String,
    pub urls: Vec<LinkOut>,
}

/// Links for one set of source UIDs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Linkset {
    pub db_from: String,
    pub ids: Vec<String>,
    pub link_lists: Vec<LinkList>,
    pub webenv: Option<String>,
    pub histories: Vec<LinkHistory>,
    pub checks: Vec<IdCheck>,
    pub url_sets: Vec<IdUrls>,
}

impl Linkset {
    /// History sessions for every link stored on the history server
    pub fn history_sessions(&self) -> Vec<HistorySession> {
        let Some(webenv) = &self.webenv else {
            return Vec::new();
        };
        self.histories
            .iter()
            .map(|history| HistorySession::new(webenv.as_str(), history.query_key.as_str()))
            .collect()
    }
}

impl From<ELinkSet> for Linkset {
    fn from(set: ELinkSet) -> Self {
        let link_lists = set
            .linkset_dbs
            .unwrap_or_default()
            .into_iter()
            .map(|db| LinkList {
                db_to: db.db_to,
                link_name: db.link_name,
                links: db.links.into_iter().map(Link::from).collect(),
            })
            .collect();

        let histories = set
            .linkset_db_histories
            .unwrap_or_default()
            .into_iter()
            .map(|history| LinkHistory {
                db_to: history.db_to,
                link_name: history.link_name,
                query_key: history.query_key,
            })
            .collect();

        let checks = set.id_check_list.map(checks_from).unwrap_or_default();
        let url_sets = set
            .id_url_list
            .map(|list| list.into_sets().into_iter().map(IdUrls::from).collect())
            .unwrap_or_default();

        Self {
            db_from: set.db_from,
            ids: set.ids.iter().map(value_to_string).collect(),
            link_lists,
            webenv: set.webenv,
            histories,
            checks,
            url_sets,
        }
    }
}

fn checks_from(list: ELinkIdCheckList) -> Vec<IdCheck> {
    let flags = list.ids.into_iter().map(|check| IdCheck {
        id: check.value,
        has_neighbor: check.has_neighbor.as_deref().map(is_yes),
        has_linkout: check.has_linkout.as_deref().map(is_yes),
        link_infos: Vec::new(),
    });
    let infos = list.id_link_sets.into_iter().map(|set| IdCheck {
        id: set.id,
        has_neighbor: None,
        has_linkout: None,
        link_infos: set.link_infos.into_iter().map(LinkInfo::from).collect(),
    });
    flags.chain(infos).collect()
}

fn is_yes(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("y")
}

impl From<ELinkInfo> for LinkInfo {
    fn from(info: ELinkInfo) -> Self {
        Self {
            db_to: info.db_to,
            link_name: info.link_name,
            menu_tag: info.menu_tag,
            html_tag: info.html_tag,
            priority: info.priority,
        }
    }
}

impl From<ELinkIdUrlSet> for IdUrls {
    fn from(set: ELinkIdUrlSet) -> Self {
        Self {
            id: set.id,
            urls: set.obj_urls.into_iter().filter_map(LinkOut::from_obj_url).collect(),
        }
    }
}

impl LinkOut {
    fn from_obj_url(obj: ELinkObjUrl) -> Option<Self> {
        let url = match obj.url? {
            Value::String(url) => url,
            Value::Object(mut fields) => match fields.remove("value")? {
                Value::String(url) => url,
                _ => return None,
            },
            _ => return None,
        };
        Some(Self {
            url,
            link_name: obj.link_name,
            provider: obj.provider.and_then(|provider| provider.name),
        })
    }
}

impl From<ELinkEntry> for Link {
    fn from(entry: ELinkEntry) -> Self {
        match entry {
            ELinkEntry::Id(id) => Link { id, score: None },
            ELinkEntry::Number(id) => Link {
                id: id.to_string(),
                score: None,
            },
            ELinkEntry::Scored { id, score } => Link {
                id,
                score: score.as_ref().map(value_to_string),
            },
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accumulated elink result
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElinkResult {
    pub linksets: Vec<Linkset>,
}

impl ElinkResult {
    /// Linked UIDs in `db_to`, across all link sets
    pub fn uids(&self, db_to: &str) -> Vec<&str> {
        self.linksets
            .iter()
            .flat_map(|set| &set.link_lists)
            .filter(|list| list.db_to == db_to)
            .flat_map(|list| &list.links)
            .map(|link| link.id.as_str())
            .collect()
    }

    /// Every history session created by the link command
    pub fn history_sessions(&self) -> Vec<HistorySession> {
        self.linksets
            .iter()
            .flat_map(Linkset::history_sessions)
            .collect()
    }

    /// Per-UID answers of the check commands
    pub fn checks(&self) -> impl Iterator<Item = &IdCheck> {
        self.linksets.iter().flat_map(|set| &set.checks)
    }

    /// Per-UID LinkOut URLs
    pub fn url_sets(&self) -> impl Iterator<Item = &IdUrls> {
        self.linksets.iter().flat_map(|set| &set.url_sets)
    }
}

impl EutilsResult for ElinkResult {
    fn size(&self) -> usize {
        self.linksets
            .iter()
            .map(|set| {
                set.link_lists.iter().map(|l| l.links.len()).sum::<usize>()
                    + set.histories.len()
                    + set.checks.iter().map(IdCheck::size).sum::<usize>()
                    + set.url_sets.iter().map(|u| u.urls.len()).sum::<usize>()
            })
            .sum()
    }

    fn dump(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Analyzer collecting elink link sets
#[derive(Debug, Default)]
pub struct ElinkAnalyzer {
    result: ElinkResult,
    errors: usize,
}

impl ElinkAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&mut self, payload: &str) -> Result<()> {
        let response: ELinkResponse = serde_json::from_str(payload)?;
        check_service_error(response.error.as_deref(), Eutil::ELink)?;
        self.result
            .linksets
            .extend(response.linksets.into_iter().map(Linkset::from));
        Ok(())
    }
}

impl Analyzer for ElinkAnalyzer {
    type Output = ElinkResult;

    fn interpret(&mut self, _request: &Request, payload: &str) -> Result<()> {
        let parsed = self.parse(payload);
        if parsed.is_err() {
            self.errors += 1;
        }
        parsed
    }

    fn is_success(&self) -> bool {
        self.errors == 0
    }

    fn result(&self) -> &ElinkResult {
        &self.result
    }

    fn into_result(self) -> ElinkResult {
        self.result
    }
}
