use tracing::debug;

use super::{
    any_set, check_parsed, combine, parse_lines, read_values, render_lines, reset_groups,
    store_working_set, validate_schema, write_or_remove, Context, NameService,
};
use crate::codec::{BoolStyle, PropType};
use crate::legacy::LegacyFile;
use crate::schema::{Codec, PropSpec, Schema, Separator, WorkingSet};
use crate::{Outcome, Result};

const CONFIG: &str = "config";
const CRED: &str = "cred";
const MANPAGE: &str = "ldapclient(8)";

static AUTH_METHODS: &[&str] = &[
    "none",
    "simple",
    "sasl/CRAM-MD5",
    "sasl/DIGEST-MD5",
    "sasl/DIGEST-MD5:auth-int",
    "sasl/DIGEST-MD5:auth-conf",
    "sasl/EXTERNAL",
    "sasl/GSSAPI",
    "tls:simple",
    "tls:sasl/CRAM-MD5",
    "tls:sasl/DIGEST-MD5",
    "tls:sasl/DIGEST-MD5:auth-int",
    "tls:sasl/DIGEST-MD5:auth-conf",
    "tls:sasl/EXTERNAL",
];

static CRED_LEVELS: &[&str] = &["anonymous", "proxy", "self"];

static SEARCH_SCOPES: &[&str] = &["base", "one", "sub"];

const TF: Codec = Codec::Boolean(BoolStyle::TrueFalse);

/// In render order; `config` lands in the client file, `cred` in the
/// credential file.
static SPECS: &[PropSpec] = &[
    PropSpec::new(CONFIG, "file_version", PropType::Astring, "NS_LDAP_FILE_VERSION", Separator::Single),
    PropSpec::new(CONFIG, "server_list", PropType::Host, "NS_LDAP_SERVERS", Separator::Comma),
    PropSpec::new(CONFIG, "search_base", PropType::Astring, "NS_LDAP_SEARCH_BASEDN", Separator::Single),
    PropSpec::new(CONFIG, "authentication_method", PropType::Astring, "NS_LDAP_AUTH", Separator::Semicolon)
        .codec(Codec::Enum(AUTH_METHODS)),
    PropSpec::new(CONFIG, "credential_level", PropType::Astring, "NS_LDAP_CREDENTIAL_LEVEL", Separator::Space)
        .codec(Codec::Enum(CRED_LEVELS)),
    PropSpec::new(CONFIG, "search_scope", PropType::Astring, "NS_LDAP_SEARCH_SCOPE", Separator::Single)
        .codec(Codec::Enum(SEARCH_SCOPES)),
    PropSpec::new(CONFIG, "search_time_limit", PropType::Integer, "NS_LDAP_SEARCH_TIME", Separator::Single),
    PropSpec::new(CONFIG, "bind_time_limit", PropType::Integer, "NS_LDAP_BIND_TIME", Separator::Single),
    PropSpec::new(CONFIG, "follow_referrals", PropType::Boolean, "NS_LDAP_FOLLOWREF", Separator::Single)
        .codec(TF),
    PropSpec::new(CONFIG, "profile", PropType::Astring, "NS_LDAP_PROFILE", Separator::Single),
    PropSpec::new(CONFIG, "profile_ttl", PropType::Integer, "NS_LDAP_CACHETTL", Separator::Single),
    PropSpec::new(CONFIG, "preferred_server_list", PropType::Host, "NS_LDAP_SERVER_PREF", Separator::Comma),
    PropSpec::new(CONFIG, "service_search_descriptor", PropType::Astring, "NS_LDAP_SERVICE_SEARCH_DESC", Separator::PerLine),
    PropSpec::new(CONFIG, "attribute_map", PropType::Astring, "NS_LDAP_ATTRIBUTEMAP", Separator::PerLine),
    PropSpec::new(CONFIG, "objectclass_map", PropType::Astring, "NS_LDAP_OBJECTCLASSMAP", Separator::PerLine),
    PropSpec::new(CONFIG, "service_authentication_method", PropType::Astring, "NS_LDAP_SERVICE_AUTH_METHOD", Separator::PerLine)
        .codec(Codec::ServiceEnum(AUTH_METHODS, ';')),
    PropSpec::new(CONFIG, "service_credential_level", PropType::Astring, "NS_LDAP_SERVICE_CRED_LEVEL", Separator::PerLine)
        .codec(Codec::ServiceEnum(CRED_LEVELS, ' ')),
    PropSpec::new(CONFIG, "host_certpath", PropType::Astring, "NS_LDAP_HOST_CERTPATH", Separator::Single),
    PropSpec::new(CONFIG, "enable_shadow_update", PropType::Boolean, "NS_LDAP_ENABLE_SHADOW_UPDATE", Separator::Single)
        .codec(TF),
    PropSpec::new(CRED, "bind_dn", PropType::Astring, "NS_LDAP_BINDDN", Separator::Single),
    PropSpec::new(CRED, "bind_passwd", PropType::Astring, "NS_LDAP_BINDPASSWD", Separator::Single),
    PropSpec::new(CRED, "admin_bind_dn", PropType::Astring, "NS_LDAP_ADMIN_BINDDN", Separator::Single),
    PropSpec::new(CRED, "admin_bind_passwd", PropType::Astring, "NS_LDAP_ADMIN_BINDPASSWD", Separator::Single),
];

/// LDAP client: `ldap_client_file` and `ldap_client_cred`.
pub struct Ldap {
    ctx: Context,
    schema: Schema,
    client: LegacyFile,
    cred: LegacyFile,
}

impl Ldap {
    pub fn new(ctx: Context) -> Result<Self> {
        let client = LegacyFile::new(ctx.path("var/ldap/ldap_client_file"), MANPAGE);
        let cred = LegacyFile::new(ctx.path("var/ldap/ldap_client_cred"), MANPAGE).with_mode(0o400);
        Ok(Self {
            schema: Schema::new(SPECS)?,
            client,
            cred,
            ctx,
        })
    }

    fn render(&self, group: &str) -> Result<Option<String>> {
        let mut body = String::new();
        for spec in self.schema.in_group(group) {
            for line in render_lines(&self.ctx, spec)? {
                body.push_str(&format!("{}= {}\n", spec.legacy, line));
            }
        }
        Ok((!body.is_empty()).then_some(body))
    }

    fn parse(&self, group: &str, lines: &[String]) -> WorkingSet {
        let mut set = WorkingSet::new();
        for (n, line) in parse_lines(lines) {
            let Some((key, value)) = line.split_once('=') else {
                debug!("line {}: no '=' in {:?}, skipping", n, line);
                continue;
            };
            match self.schema.lookup_legacy(group, key.trim()) {
                Some(spec) => set.accept(spec.parse_entry(n, value)),
                None => debug!("line {}: ignoring {}", n, key.trim()),
            }
        }
        set
    }
}

impl NameService for Ldap {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn export_from_smf(&mut self) -> Result<Outcome> {
        let client = self
            .render(CONFIG)
            .and_then(|body| write_or_remove(&self.ctx, &self.client, body, true));
        let cred = self
            .render(CRED)
            .and_then(|body| write_or_remove(&self.ctx, &self.cred, body, true));
        combine(vec![client, cred])
    }

    fn import_to_smf(&mut self) -> Result<Outcome> {
        let Some(client_lines) = self.client.load_lines()? else {
            return Ok(Outcome::NoConfig);
        };
        let mut set = self.parse(CONFIG, &client_lines);
        let cred_set = match self.cred.load_lines()? {
            Some(lines) => self.parse(CRED, &lines),
            None => WorkingSet::new(),
        };

        check_parsed(&[(self.client.path(), &set), (self.cred.path(), &cred_set)])?;
        set.extend(cred_set);
        let path = self.client.path().to_path_buf();
        store_working_set(&mut self.ctx, &path, &[CONFIG, CRED], set)
    }

    fn unconfig_smf(&mut self) -> Result<Outcome> {
        reset_groups(&mut self.ctx, [CONFIG, CRED])
    }

    fn validate_smf(&mut self) -> Result<Outcome> {
        let schema = self.schema;
        validate_schema(&mut self.ctx, &schema)
    }

    fn is_populated(&self) -> Result<bool> {
        let lookup = |name: &str| self.schema.lookup(CONFIG, name);
        for required in ["file_version", "search_base"] {
            match lookup(required) {
                Some(spec) if read_values(&self.ctx, spec)?.is_some() => {}
                _ => return Ok(false),
            }
        }
        any_set(
            &self.ctx,
            ["server_list", "preferred_server_list"]
                .into_iter()
                .filter_map(lookup),
        )
    }

    fn is_autogenerated(&self) -> bool {
        if !self.client.is_autogenerated() {
            return false;
        }
        if !self.cred.exists() {
            return true;
        }
        self.cred.is_autogenerated()
    }
}
