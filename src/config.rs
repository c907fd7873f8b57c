//! Connection string parsing.
//!
//! ```text
//! mongodb[+srv]://[user[:password]@]host[:port][,host[:port]...][/database][?key=value&...]
//! ```

use crate::error::{MongoError, Result};
use crate::options::{
    Acknowledgment, ReadConcern, ReadConcernLevel, ReadPreference, ReadPreferenceMode,
    WriteConcern,
};
use bson::Document;
use percent_encoding::percent_decode_str;
use std::fmt;

/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;

/// Characters a database name may not contain.
const FORBIDDEN_DB_CHARS: [char; 6] = ['/', '\\', ' ', '"', '$', '.'];

/// URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `mongodb://`: an explicit seed list.
    Standard,
    /// `mongodb+srv://`: a DNS name resolved to a seed list.
    Srv,
}

/// One seed host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// Explicit port, if given.
    pub port: Option<u16>,
}

impl HostAddress {
    /// Port, falling back to the default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port_or_default())
        } else {
            write!(f, "{}:{}", self.host, self.port_or_default())
        }
    }
}

/// A parsed and validated connection string.
#[derive(Clone, PartialEq)]
pub struct ConnectionString {
    raw: String,
    /// URL scheme.
    pub scheme: Scheme,
    /// Decoded user name.
    pub username: Option<String>,
    /// Decoded password.
    pub password: Option<String>,
    /// Seed list.
    pub hosts: Vec<HostAddress>,
    /// Database used when none is named explicitly.
    pub default_database: Option<String>,
    /// `replicaSet`.
    pub replica_set: Option<String>,
    /// `authSource`.
    pub auth_source: Option<String>,
    /// `appName`.
    pub app_name: Option<String>,
    /// `maxPoolSize`.
    pub max_pool_size: Option<u32>,
    /// `minPoolSize`.
    pub min_pool_size: Option<u32>,
    /// `connectTimeoutMS`.
    pub connect_timeout_ms: Option<u64>,
    /// `serverSelectionTimeoutMS`.
    pub server_selection_timeout_ms: Option<u64>,
    /// `tls` / `ssl`.
    pub tls: Option<bool>,
    /// `tlsCAFile`.
    pub tls_ca_file: Option<String>,
    /// `tlsAllowInvalidCertificates`.
    pub tls_allow_invalid_certificates: Option<bool>,
    /// `directConnection`.
    pub direct_connection: Option<bool>,
    /// `w`, `wtimeoutMS`, `journal`.
    pub write_concern: Option<WriteConcern>,
    /// `readConcernLevel`.
    pub read_concern: Option<ReadConcern>,
    /// `readPreference`.
    pub read_preference: Option<ReadPreference>,
    /// Options this parser does not interpret, kept for the driver.
    pub other_options: Vec<(String, String)>,
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("hosts", &self.hosts)
            .field("default_database", &self.default_database)
            .finish_non_exhaustive()
    }
}

impl ConnectionString {
    /// Parse and validate a connection string.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = if let Some(rest) = uri.strip_prefix("mongodb+srv://") {
            (Scheme::Srv, rest)
        } else if let Some(rest) = uri.strip_prefix("mongodb://") {
            (Scheme::Standard, rest)
        } else {
            return Err(MongoError::configuration(
                "connection string must start with mongodb:// or mongodb+srv://",
            ));
        };

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match location.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (location, None),
        };
        let (userinfo, host_list) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };

        let mut conn = ConnectionString {
            raw: uri.to_string(),
            scheme,
            username: None,
            password: None,
            hosts: Vec::new(),
            default_database: None,
            replica_set: None,
            auth_source: None,
            app_name: None,
            max_pool_size: None,
            min_pool_size: None,
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
            tls: None,
            tls_ca_file: None,
            tls_allow_invalid_certificates: None,
            direct_connection: None,
            write_concern: None,
            read_concern: None,
            read_preference: None,
            other_options: Vec::new(),
        };

        if let Some(userinfo) = userinfo {
            let (user, password) = match userinfo.split_once(':') {
                Some((user, password)) => (user, Some(password)),
                None => (userinfo, None),
            };
            if user.is_empty() {
                return Err(MongoError::configuration("user name must not be empty"));
            }
            conn.username = Some(decode(user)?);
            conn.password = password.map(decode).transpose()?;
        }

        conn.hosts = host_list
            .split(',')
            .map(parse_host)
            .collect::<Result<Vec<_>>>()?;

        if scheme == Scheme::Srv {
            if conn.hosts.len() != 1 {
                return Err(MongoError::configuration(
                    "mongodb+srv:// requires exactly one host",
                ));
            }
            if conn.hosts[0].port.is_some() {
                return Err(MongoError::configuration(
                    "mongodb+srv:// host must not have a port",
                ));
            }
        }

        if let Some(path) = path {
            let name = decode(path)?;
            if name.contains(FORBIDDEN_DB_CHARS) {
                return Err(MongoError::configuration(format!(
                    "invalid database name {:?}",
                    name
                )));
            }
            if !name.is_empty() {
                conn.default_database = Some(name);
            }
        }

        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    MongoError::configuration(format!("option {:?} has no value", pair))
                })?;
                conn.apply_option(key, &decode(value)?)?;
            }
        }

        if scheme == Scheme::Srv && conn.tls.is_none() {
            conn.tls = Some(true);
        }
        if conn.direct_connection == Some(true) && conn.hosts.len() > 1 {
            return Err(MongoError::configuration(
                "directConnection=true requires a single host",
            ));
        }

        Ok(conn)
    }

    /// The string this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_ascii_lowercase().as_str() {
            "replicaset" => self.replica_set = Some(value.to_string()),
            "authsource" => self.auth_source = Some(value.to_string()),
            "appname" => self.app_name = Some(value.to_string()),
            "maxpoolsize" => self.max_pool_size = Some(parse_number(key, value)?),
            "minpoolsize" => self.min_pool_size = Some(parse_number(key, value)?),
            "connecttimeoutms" => self.connect_timeout_ms = Some(parse_number(key, value)?),
            "serverselectiontimeoutms" => {
                self.server_selection_timeout_ms = Some(parse_number(key, value)?)
            }
            "tls" | "ssl" => self.tls = Some(parse_bool(key, value)?),
            "tlscafile" => self.tls_ca_file = Some(value.to_string()),
            "tlsallowinvalidcertificates" => {
                self.tls_allow_invalid_certificates = Some(parse_bool(key, value)?)
            }
            "directconnection" => self.direct_connection = Some(parse_bool(key, value)?),
            "w" => {
                let w = match value.parse::<u32>() {
                    Ok(n) => Acknowledgment::Nodes(n),
                    Err(_) if value == "majority" => Acknowledgment::Majority,
                    Err(_) => Acknowledgment::Custom(value.to_string()),
                };
                self.write_concern.get_or_insert_with(Default::default).w = Some(w);
            }
            "wtimeoutms" => {
                self.write_concern
                    .get_or_insert_with(Default::default)
                    .w_timeout_ms = Some(parse_number(key, value)?);
            }
            "journal" => {
                self.write_concern.get_or_insert_with(Default::default).journal =
                    Some(parse_bool(key, value)?);
            }
            "readconcernlevel" => {
                self.read_concern = Some(ReadConcern {
                    level: ReadConcernLevel::from_str(value),
                })
            }
            "readpreference" => {
                let mode = ReadPreferenceMode::from_str(value).ok_or_else(|| {
                    MongoError::configuration(format!("unknown readPreference {:?}", value))
                })?;
                self.read_preference
                    .get_or_insert_with(ReadPreference::default)
                    .mode = mode;
            }
            "readpreferencetags" => {
                let mut tags = Document::new();
                for tag in value.split(',').filter(|t| !t.is_empty()) {
                    let (name, tag_value) = tag.split_once(':').ok_or_else(|| {
                        MongoError::configuration(format!("malformed readPreferenceTags {:?}", value))
                    })?;
                    tags.insert(name, tag_value);
                }
                self.read_preference
                    .get_or_insert_with(ReadPreference::default)
                    .tag_sets
                    .get_or_insert_with(Vec::new)
                    .push(tags);
            }
            "maxstalenessseconds" => {
                let secs: i64 = parse_number(key, value)?;
                self.read_preference
                    .get_or_insert_with(ReadPreference::default)
                    .max_staleness_secs = u64::try_from(secs).ok();
            }
            _ => self.other_options.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }
}

impl std::str::FromStr for ConnectionString {
    type Err = MongoError;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionString::parse(s)
    }
}

fn decode(s: &str) -> Result<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| MongoError::configuration(format!("invalid percent-encoding: {}", e)))
}

fn parse_host(spec: &str) -> Result<HostAddress> {
    if spec.is_empty() {
        return Err(MongoError::configuration("empty host in seed list"));
    }

    let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            MongoError::configuration(format!("unterminated IPv6 literal {:?}", spec))
        })?;
        match tail {
            "" => (host, None),
            tail => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => {
                    return Err(MongoError::configuration(format!("invalid host {:?}", spec)))
                }
            },
        }
    } else {
        match spec.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (spec, None),
        }
    };

    if host.is_empty() {
        return Err(MongoError::configuration(format!("invalid host {:?}", spec)));
    }

    let port = match port {
        Some(port) => match port.parse::<u16>() {
            Ok(p) if p > 0 => Some(p),
            _ => {
                return Err(MongoError::configuration(format!(
                    "invalid port {:?} for host {:?}",
                    port, host
                )))
            }
        },
        None => None,
    };

    Ok(HostAddress {
        host: decode(host)?.to_ascii_lowercase(),
        port,
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        MongoError::configuration(format!("option {} expects a number, got {:?}", key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(MongoError::configuration(format!(
            "option {} expects true or false, got {:?}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_minimal() {
        let conn = ConnectionString::parse("mongodb://localhost").unwrap();
        assert_eq!(conn.scheme, Scheme::Standard);
        assert_eq!(conn.hosts, vec![HostAddress { host: "localhost".into(), port: None }]);
        assert_eq!(conn.hosts[0].to_string(), "localhost:27017");
        assert_eq!(conn.default_database, None);
    }

    #[test]
    fn test_parse_full() {
        let conn = ConnectionString::parse(
            "mongodb://al%40ice:p%3Ass@h1:27017,h2:27018/test_db?replicaSet=rs1&w=majority&journal=true&readPreference=secondaryPreferred&maxPoolSize=20&custom=1",
        )
        .unwrap();

        assert_eq!(conn.username.as_deref(), Some("al@ice"));
        assert_eq!(conn.password.as_deref(), Some("p:ss"));
        assert_eq!(conn.hosts.len(), 2);
        assert_eq!(conn.hosts[1].port, Some(27018));
        assert_eq!(conn.default_database.as_deref(), Some("test_db"));
        assert_eq!(conn.replica_set.as_deref(), Some("rs1"));
        assert_eq!(conn.max_pool_size, Some(20));

        let wc = conn.write_concern.unwrap();
        assert_eq!(wc.w, Some(Acknowledgment::Majority));
        assert_eq!(wc.journal, Some(true));
        assert_eq!(
            conn.read_preference.unwrap().mode,
            ReadPreferenceMode::SecondaryPreferred
        );
        assert_eq!(conn.other_options, vec![("custom".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_parse_read_preference_tags() {
        let conn = ConnectionString::parse(
            "mongodb://h1/?readPreference=secondary&readPreferenceTags=dc:ny,rack:1&readPreferenceTags=dc:sf&readPreferenceTags=",
        )
        .unwrap();
        let rp = conn.read_preference.unwrap();
        assert_eq!(rp.mode, ReadPreferenceMode::Secondary);
        assert_eq!(
            rp.tag_sets,
            Some(vec![
                bson::doc! { "dc": "ny", "rack": "1" },
                bson::doc! { "dc": "sf" },
                Document::new(),
            ])
        );

        assert!(ConnectionString::parse("mongodb://h1/?readPreferenceTags=dc").is_err());
    }

    #[test]
    fn test_parse_ipv6() {
        let conn = ConnectionString::parse("mongodb://[::1]:27019/db").unwrap();
        assert_eq!(conn.hosts[0].host, "::1");
        assert_eq!(conn.hosts[0].port, Some(27019));
        assert_eq!(conn.hosts[0].to_string(), "[::1]:27019");
    }

    #[test]
    fn test_srv_rules() {
        let conn = ConnectionString::parse("mongodb+srv://cluster.example.com/app").unwrap();
        assert_eq!(conn.scheme, Scheme::Srv);
        assert_eq!(conn.tls, Some(true));

        assert!(ConnectionString::parse("mongodb+srv://a.example.com:27017").is_err());
        assert!(ConnectionString::parse("mongodb+srv://a.example.com,b.example.com").is_err());
    }

    #[test]
    fn test_malformed_strings() {
        for bad in [
            "http://localhost",
            "mongodb://",
            "mongodb://host:0",
            "mongodb://host:70000",
            "mongodb://host:abc",
            "mongodb://a,,b",
            "mongodb://:pw@host",
            "mongodb://host/bad$name",
            "mongodb://host/?maxPoolSize=lots",
            "mongodb://host/?tls=yes",
            "mongodb://host/?readPreference=sometimes",
            "mongodb://host/?flag",
            "mongodb://a,b/?directConnection=true",
        ] {
            let err = ConnectionString::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{bad}");
        }
    }

    #[test]
    fn test_option_names_case_insensitive() {
        let conn =
            ConnectionString::parse("mongodb://h/?SERVERSELECTIONTIMEOUTMS=500&ssl=false").unwrap();
        assert_eq!(conn.server_selection_timeout_ms, Some(500));
        assert_eq!(conn.tls, Some(false));
    }

    #[test]
    fn test_debug_redacts_password() {
        let conn = ConnectionString::parse("mongodb://u:secret@h").unwrap();
        assert!(!format!("{:?}", conn).contains("secret"));
    }
}
