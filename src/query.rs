// src/query.rs
//! Filter, sort and paginate a snapshot for one request.
//!
//! Nothing here touches shared state: callers hand in a snapshot and get back
//! an owned [`QueryView`].

use std::borrow::Borrow;
use std::time::UNIX_EPOCH;
use serde::Serialize;
use crate::models::server::{ServerRecord, VersionCount};
use crate::storage::memory::Snapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    /// Most players first, ties by name.
    #[default]
    Players,
    Name,
    Time,
    ReverseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Name,
    Desc,
    Tag,
    Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Search {
    pub field: SearchField,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    pub search: Option<Search>,
    pub version: Option<String>,
    pub vanilla_only: bool,
    pub modded_only: bool,
    pub any_mods: bool,
    pub has_pass: bool,
    pub any_pass: bool,
    pub has_play: bool,
    pub no_play: bool,
    pub sort: SortBy,
    pub page: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            search: None,
            version: None,
            vanilla_only: false,
            modded_only: false,
            any_mods: false,
            has_pass: false,
            any_pass: false,
            has_play: false,
            no_play: false,
            sort: SortBy::Players,
            page: 1,
        }
    }
}

impl QueryParams {
    /// Reads query-string pairs in the order they were sent.
    ///
    /// Only the first search key (`name`, `desc`, `tag`, `player`) counts, even
    /// when its value is empty. The last sort key and the last valid `page`
    /// win. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        let mut search_seen = false;

        for (key, value) in pairs {
            let key = key.as_ref().to_ascii_lowercase();
            let value = value.as_ref();
            if key.is_empty() {
                continue;
            }

            let field = match key.as_str() {
                "name" => Some(SearchField::Name),
                "desc" => Some(SearchField::Desc),
                "tag" => Some(SearchField::Tag),
                "player" => Some(SearchField::Player),
                _ => None,
            };
            if let Some(field) = field {
                if !search_seen {
                    search_seen = true;
                    if !value.is_empty() {
                        params.search = Some(Search {
                            field,
                            text: value.to_string(),
                        });
                    }
                }
                continue;
            }

            match key.as_str() {
                "version" => {
                    params.version = (!value.is_empty()).then(|| value.to_string());
                }
                "vanilla" => params.vanilla_only = true,
                "modded" => params.modded_only = true,
                "both" => params.any_mods = true,
                "haspass" => params.has_pass = true,
                "anypass" => params.any_pass = true,
                "hasplay" => params.has_play = true,
                "noplay" => params.no_play = true,
                "sort-players" => params.sort = SortBy::Players,
                "sort-name" => params.sort = SortBy::Name,
                "sort-time" => params.sort = SortBy::Time,
                "sort-rtime" => params.sort = SortBy::ReverseTime,
                "page" => {
                    if let Ok(page) = value.trim().parse::<usize>() {
                        params.page = page;
                    }
                }
                _ => {}
            }
        }

        params
    }

    fn search_lower(&self) -> Option<String> {
        self.search.as_ref().map(|s| s.text.to_lowercase())
    }

    // Cheapest checks that drop the most servers come first.
    fn matches_with(&self, server: &ServerRecord, needle: Option<&str>) -> bool {
        if !self.any_pass && self.has_pass != server.info.has_password {
            return false;
        }

        if self.has_play && !server.has_players() {
            return false;
        }
        if self.no_play && server.has_players() {
            return false;
        }

        if !self.any_mods {
            if self.modded_only && !server.local.modded {
                return false;
            }
            if self.vanilla_only && server.local.modded {
                return false;
            }
        }

        if let Some(version) = &self.version {
            if &server.info.application_version.game_version != version {
                return false;
            }
        }

        match (&self.search, needle) {
            (Some(search), Some(needle)) => {
                let hit = |text: &String| !text.is_empty() && text.to_lowercase().contains(needle);
                match search.field {
                    SearchField::Name => hit(&server.info.name),
                    SearchField::Desc => hit(&server.info.description),
                    SearchField::Tag => server.info.tags.iter().any(hit),
                    SearchField::Player => server.info.players.iter().any(hit),
                }
            }
            _ => true,
        }
    }
}

fn record<T: Borrow<ServerRecord>>(item: &T) -> &ServerRecord {
    item.borrow()
}

/// Stable sort of servers by the requested key.
pub fn sort_servers<T: Borrow<ServerRecord>>(list: &mut [T], sort: SortBy) {
    match sort {
        SortBy::Name => list.sort_by(|a, b| record(a).info.name.cmp(&record(b).info.name)),
        SortBy::Time => list.sort_by_key(|s| record(s).local.minutes),
        SortBy::ReverseTime => {
            list.sort_by(|a, b| record(b).local.minutes.cmp(&record(a).local.minutes))
        }
        SortBy::Players => list.sort_by(|a, b| {
            let (a, b) = (record(a), record(b));
            b.player_count()
                .cmp(&a.player_count())
                .then_with(|| a.info.name.cmp(&b.info.name))
        }),
    }
}

/// Which slice of the filtered list a page covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub range: Option<std::ops::Range<usize>>,
    pub current_page: usize,
    pub total_pages: usize,
}

pub fn paginate(total: usize, page: usize, page_size: usize) -> Page {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let total_pages = total.div_ceil(page_size);

    let end = page.saturating_mul(page_size).min(total);
    let mut start = (page - 1).saturating_mul(page_size) as i128;
    if start > total as i128 {
        // Overshoot: fall back to the trailing page.
        start = total as i128 - page_size as i128;
    }

    if start < 0 {
        return Page {
            range: None,
            current_page: 0,
            total_pages,
        };
    }

    let current_page = if page > total_pages { total_pages } else { page };
    Page {
        range: Some(start as usize..end),
        current_page,
        total_pages,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedServer {
    /// 1-based position in the filtered, sorted list.
    pub rank: usize,
    #[serde(flatten)]
    pub server: ServerRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryView {
    pub servers: Vec<RankedServer>,
    pub total_count: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
    pub params: QueryParams,
    pub servers_count: usize,
    pub player_count: usize,
    pub versions: Vec<VersionCount>,
    pub last_refresh: Option<u64>,
}

pub fn run_query(snapshot: &Snapshot, params: &QueryParams, page_size: usize) -> QueryView {
    let needle = params.search_lower();
    let mut filtered: Vec<&ServerRecord> = snapshot
        .servers
        .iter()
        .filter(|s| params.matches_with(s, needle.as_deref()))
        .collect();
    sort_servers(&mut filtered, params.sort);

    let page = paginate(filtered.len(), params.page, page_size);
    let servers = match &page.range {
        Some(range) => filtered[range.clone()]
            .iter()
            .zip(range.clone())
            .map(|(server, idx)| RankedServer {
                rank: idx + 1,
                server: (*server).clone(),
            })
            .collect(),
        None => Vec::new(),
    };

    QueryView {
        servers,
        total_count: filtered.len(),
        total_pages: page.total_pages,
        current_page: page.current_page,
        page_size,
        params: params.clone(),
        servers_count: snapshot.servers.len(),
        player_count: snapshot.player_count,
        versions: snapshot.versions.clone(),
        last_refresh: snapshot
            .captured_at
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::{AppVersion, ServerInfo, ServerMeta};

    fn server(name: &str, players: &[&str]) -> ServerRecord {
        ServerRecord {
            info: ServerInfo {
                name: name.to_string(),
                players: players.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn numbered(n: usize) -> Snapshot {
        let servers = (1..=n).map(|i| server(&format!("server {:02}", i), &[])).collect();
        Snapshot::new(servers, None)
    }

    fn query(snapshot: &Snapshot, pairs: &[(&str, &str)]) -> QueryView {
        run_query(snapshot, &QueryParams::from_pairs(pairs.iter().copied()), 25)
    }

    fn names(view: &QueryView) -> Vec<&str> {
        view.servers.iter().map(|s| s.server.info.name.as_str()).collect()
    }

    #[test]
    fn test_second_page_of_thirty() {
        let snapshot = numbered(30);
        let view = query(&snapshot, &[("page", "2")]);
        assert_eq!(view.servers.len(), 5);
        assert_eq!(view.servers[0].rank, 26);
        assert_eq!(view.servers[4].rank, 30);
        assert_eq!(view.servers[0].server.info.name, "server 26");
        assert_eq!(view.current_page, 2);
        assert_eq!(view.total_pages, 2);
    }

    #[test]
    fn test_overshooting_page_clamps() {
        let snapshot = numbered(30);
        let view = query(&snapshot, &[("page", "3")]);
        assert_eq!(view.current_page, 2);
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.servers.len(), 25);
        assert_eq!(view.servers[0].rank, 6);
        assert_eq!(view.servers.last().map(|s| s.rank), Some(30));
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let snapshot = numbered(30);
        let zero = query(&snapshot, &[("page", "0")]);
        let one = query(&snapshot, &[("page", "1")]);
        assert_eq!(zero.current_page, 1);
        assert_eq!(names(&zero), names(&one));
        assert_eq!(zero.servers[0].rank, 1);
    }

    #[test]
    fn test_bad_page_is_ignored() {
        let snapshot = numbered(30);
        let view = query(&snapshot, &[("page", "2"), ("page", "two")]);
        assert_eq!(view.current_page, 2);
    }

    #[test]
    fn test_paginate_edges() {
        assert_eq!(
            paginate(0, 1, 25),
            Page { range: Some(0..0), current_page: 0, total_pages: 0 }
        );
        assert_eq!(
            paginate(10, 2, 25),
            Page { range: None, current_page: 0, total_pages: 1 }
        );
        assert_eq!(
            paginate(10, 1, 25),
            Page { range: Some(0..10), current_page: 1, total_pages: 1 }
        );
        assert_eq!(paginate(30, usize::MAX, 25).current_page, 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let view = query(&Snapshot::default(), &[]);
        assert!(view.servers.is_empty());
        assert_eq!(view.current_page, 0);
        assert_eq!(view.total_pages, 0);
    }

    #[test]
    fn test_default_sort_ties_by_name() {
        let snapshot = Snapshot::new(
            vec![
                server("zeta", &["a", "b"]),
                server("alpha", &["c", "d"]),
                server("busy", &["e", "f", "g"]),
                server("empty", &[]),
            ],
            None,
        );
        let view = query(&snapshot, &[]);
        assert_eq!(names(&view), vec!["busy", "alpha", "zeta", "empty"]);
    }

    #[test]
    fn test_sort_keys() {
        let mut a = server("b", &[]);
        a.local.minutes = 50;
        let mut b = server("a", &[]);
        b.local.minutes = 10;
        let mut c = server("c", &["x"]);
        c.local.minutes = 30;
        let snapshot = Snapshot::new(vec![a, b, c], None);

        assert_eq!(names(&query(&snapshot, &[("sort-name", "")])), vec!["a", "b", "c"]);
        assert_eq!(names(&query(&snapshot, &[("sort-time", "")])), vec!["a", "c", "b"]);
        assert_eq!(names(&query(&snapshot, &[("sort-rtime", "")])), vec!["b", "c", "a"]);
        assert_eq!(
            names(&query(&snapshot, &[("sort-name", ""), ("sort-players", "")])),
            vec!["c", "a", "b"]
        );
        assert_eq!(names(&query(&snapshot, &[("sort-bogus", "")])), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_first_search_key_wins() {
        let mut tagged = server("Alpha", &[]);
        tagged.info.tags = vec!["PvP".into()];
        let snapshot = Snapshot::new(vec![tagged, server("Beta pvp", &[])], None);

        let by_name = query(&snapshot, &[("name", "PVP"), ("tag", "pvp")]);
        assert_eq!(names(&by_name), vec!["Beta pvp"]);

        let by_tag = query(&snapshot, &[("tag", "pvp"), ("name", "beta")]);
        assert_eq!(names(&by_tag), vec!["Alpha"]);

        let params = QueryParams::from_pairs([("name", ""), ("tag", "pvp")]);
        assert_eq!(params.search, None);
        assert_eq!(query(&snapshot, &[("name", ""), ("tag", "pvp")]).total_count, 2);
    }

    #[test]
    fn test_player_and_description_search() {
        let mut a = server("a", &["Alice", "bob"]);
        a.info.description = "Friendly Factory".into();
        let snapshot = Snapshot::new(vec![a, server("b", &["carol"])], None);

        assert_eq!(names(&query(&snapshot, &[("player", "ALI")])), vec!["a"]);
        assert_eq!(names(&query(&snapshot, &[("desc", "factory")])), vec!["a"]);
        assert_eq!(query(&snapshot, &[("player", "dave")]).total_count, 0);
    }

    #[test]
    fn test_password_filters() {
        let mut locked = server("locked", &[]);
        locked.info.has_password = true;
        let snapshot = Snapshot::new(vec![locked, server("open", &[])], None);

        assert_eq!(names(&query(&snapshot, &[])), vec!["open"]);
        assert_eq!(names(&query(&snapshot, &[("haspass", "")])), vec!["locked"]);
        assert_eq!(query(&snapshot, &[("anypass", "")]).total_count, 2);
        assert_eq!(query(&snapshot, &[("haspass", ""), ("anypass", "")]).total_count, 2);
    }

    #[test]
    fn test_conflicting_filters_are_empty() {
        let mut modded = server("modded", &["p"]);
        modded.local = ServerMeta { modded: true, ..Default::default() };
        let snapshot = Snapshot::new(vec![modded, server("vanilla", &[])], None);

        assert_eq!(query(&snapshot, &[("modded", ""), ("vanilla", "")]).total_count, 0);
        assert_eq!(query(&snapshot, &[("hasplay", ""), ("noplay", "")]).total_count, 0);
        assert_eq!(names(&query(&snapshot, &[("modded", "")])), vec!["modded"]);
        assert_eq!(names(&query(&snapshot, &[("vanilla", "")])), vec!["vanilla"]);
        assert_eq!(names(&query(&snapshot, &[("noplay", "")])), vec!["vanilla"]);
        assert_eq!(
            query(&snapshot, &[("modded", ""), ("vanilla", ""), ("both", "")]).total_count,
            2
        );
    }

    #[test]
    fn test_version_filter() {
        let mut old = server("old", &[]);
        old.info.application_version = AppVersion { game_version: "1.1.110".into(), ..Default::default() };
        let mut new = server("new", &[]);
        new.info.application_version = AppVersion { game_version: "2.0.28".into(), ..Default::default() };
        let snapshot = Snapshot::new(vec![old, new], None);

        assert_eq!(names(&query(&snapshot, &[("version", "2.0.28")])), vec!["new"]);
        assert_eq!(query(&snapshot, &[("version", "2.0")]).total_count, 0);
        assert_eq!(query(&snapshot, &[("version", "")]).total_count, 2);
        assert_eq!(query(&snapshot, &[]).versions.len(), 2);
    }

    #[test]
    fn test_keys_are_case_insensitive_and_unknown_ignored() {
        let params = QueryParams::from_pairs([("NAME", "x"), ("Sort-Name", ""), ("utm_source", "y")]);
        assert_eq!(
            params.search,
            Some(Search { field: SearchField::Name, text: "x".into() })
        );
        assert_eq!(params.sort, SortBy::Name);
    }

    #[test]
    fn test_query_leaves_snapshot_untouched() {
        let snapshot = numbered(30);
        let before: Vec<String> = snapshot.servers.iter().map(|s| s.info.name.clone()).collect();
        let _ = query(&snapshot, &[("sort-name", ""), ("page", "2"), ("name", "1")]);
        let after: Vec<String> = snapshot.servers.iter().map(|s| s.info.name.clone()).collect();
        assert_eq!(before, after);
    }
}
