//! Apache FastCGI front end for gateways.

use anyhow::{Context as _, Result, bail};
use hosts::{ApacheLayout, ApacheModules, Host};
use regex::Regex;
use remote::{Session, check};

/// Modules the gateway vhost needs.
pub const REQUIRED_MODULES: &[&str] = &[
    "actions",
    "alias",
    "auth_basic",
    "authn_file",
    "authz_host",
    "authz_groupfile",
    "authz_user",
    "autoindex",
    "cgi",
    "dir",
    "env",
    "expires",
    "include",
    "log_config",
    "mime",
    "negotiation",
    "setenvif",
    "ssl",
    "socache_shmcb",
    "userdir",
    "reqtimeout",
    "authn_core",
    "authz_core",
    "fastcgi",
    "rewrite",
];

/// Modules switched on with `a2enmod`; the rest ship enabled on Debian.
const A2ENMOD_MODULES: &[&str] = &["fastcgi", "rewrite"];

const SYSCONFIG_KEY: &str = "APACHE_MODULES";

/// Vhost parameters for one gateway.
#[derive(Debug, Clone)]
pub struct Vhost<'a> {
    pub cluster: &'a str,
    pub entity: &'a str,
    pub socket: &'a str,
    pub fqdn: Option<&'a str>,
    pub port: u16,
    pub redirect: &'a str,
}

pub fn script_name(port: u16) -> String {
    format!("s3gw_{port}.fcgi")
}

pub fn conf_name(port: u16) -> String {
    format!("s3gw_{port}.conf")
}

fn log_dir(layout: &ApacheLayout) -> &'static str {
    if layout.conf_dir.starts_with("/etc/httpd") {
        "/var/log/httpd"
    } else {
        "/var/log/apache2"
    }
}

/// Vhost configuration routing requests to the gateway's FastCGI socket.
pub fn vhost_conf(layout: &ApacheLayout, vhost: &Vhost<'_>) -> String {
    let script = script_name(vhost.port);
    let www = layout.fcgi_dir;
    let logs = log_dir(layout);
    let server_name = match vhost.fqdn {
        Some(fqdn) => format!("ServerName {fqdn}"),
        None => "#ServerName".to_string(),
    };
    format!(
        "FastCgiExternalServer {www}/{script} -socket {socket}\n\
         \n\
         <VirtualHost *:{port}>\n\
         \t{server_name}\n\
         \tDocumentRoot {www}\n\
         \tRewriteEngine On\n\
         \tRewriteRule {redirect} /{script}?%{{QUERY_STRING}} [E=HTTP_AUTHORIZATION:%{{HTTP:Authorization}},L]\n\
         \n\
         \t<IfModule mod_fastcgi.c>\n\
         \t\t<Directory {www}>\n\
         \t\t\tOptions +ExecCGI\n\
         \t\t\tAllowOverride All\n\
         \t\t\tSetHandler fastcgi-script\n\
         \t\t\tRequire all granted\n\
         \t\t\tAuthBasicAuthoritative Off\n\
         \t\t</Directory>\n\
         \t</IfModule>\n\
         \n\
         \tAllowEncodedSlashes On\n\
         \tErrorLog {logs}/rgw-{script}-error.log\n\
         \tCustomLog {logs}/rgw-{script}-access.log combined\n\
         \tServerSignature Off\n\
         </VirtualHost>\n",
        socket = vhost.socket,
        port = vhost.port,
        redirect = vhost.redirect,
    )
}

/// Wrapper script Apache runs to reach the gateway.
pub fn fcgi_script(cluster: &str, entity: &str) -> String {
    format!("#!/bin/sh\nexec /usr/bin/radosgw -c /etc/ceph/{cluster}.conf -n {entity}\n")
}

/// Add missing modules to the `APACHE_MODULES` line of a sysconfig file.
///
/// Returns `None` when nothing needs to change.
pub fn merge_sysconfig_modules(content: &str) -> Result<Option<String>> {
    let line_re = Regex::new(&format!(r#"^\s*{SYSCONFIG_KEY}\s*=\s*"?([^"]*)"?\s*$"#))?;

    let mut found = false;
    let mut changed = false;
    let mut lines = Vec::new();
    for line in content.lines() {
        let Some(caps) = line_re.captures(line) else {
            lines.push(line.to_string());
            continue;
        };
        found = true;
        let mut modules: Vec<&str> = caps[1].split_whitespace().collect();
        for module in REQUIRED_MODULES {
            if !modules.contains(module) {
                modules.push(module);
                changed = true;
            }
        }
        lines.push(format!("{SYSCONFIG_KEY}=\"{}\"", modules.join(" ")));
    }

    if !found {
        bail!("{SYSCONFIG_KEY} is not set");
    }
    if !changed {
        return Ok(None);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(Some(out))
}

fn setup_modules(host: &Host, layout: &ApacheLayout) -> Result<()> {
    let session: &dyn Session = &**host.conn();
    match layout.modules {
        ApacheModules::Sysconfig(path) => {
            let content = session
                .read_file(path)?
                .with_context(|| format!("{}: {path} not found", host.hostname()))?;
            let merged = merge_sysconfig_modules(&content)
                .with_context(|| format!("{}: failed to read apache modules from {path}", host.hostname()))?;
            if let Some(merged) = merged {
                log::info!("{}: enabling apache modules in {path}", host.hostname());
                session.write_file(path, &merged)?;
            }
        }
        ApacheModules::A2enmod => {
            let mut argv = vec!["a2enmod", "-q"];
            argv.extend_from_slice(A2ENMOD_MODULES);
            check(session, &argv, None)?;
        }
        ApacheModules::Builtin => {}
    }
    Ok(())
}

fn write_if_absent(session: &dyn Session, host: &str, path: &str, content: &str) -> Result<()> {
    if session.path_exists(path)? {
        log::info!("{host}: {path} exists, skipping");
        return Ok(());
    }
    log::info!("{host}: writing {path}");
    session.write_file(path, content)?;
    Ok(())
}

/// Install the vhost and wrapper script for a gateway.
///
/// Existing files are left alone.
pub fn setup(host: &Host, vhost: &Vhost<'_>) -> Result<()> {
    let layout = host.platform().apache();
    setup_modules(host, &layout)?;

    let session: &dyn Session = &**host.conn();
    let name = host.hostname();
    session.makedir(layout.conf_dir)?;
    session.makedir(layout.fcgi_dir)?;

    let conf_path = format!("{}/{}", layout.conf_dir, conf_name(vhost.port));
    write_if_absent(session, name, &conf_path, &vhost_conf(&layout, vhost))?;

    let script_path = format!("{}/{}", layout.fcgi_dir, script_name(vhost.port));
    write_if_absent(session, name, &script_path, &fcgi_script(vhost.cluster, vhost.entity))?;
    session.chmod(&script_path, 0o755)?;
    Ok(())
}

/// Files in `dir` whose name matches `pattern` and that mention `needle` as a
/// whole word.
fn matching_files(session: &dyn Session, dir: &str, pattern: &Regex, needle: &str) -> Result<Vec<String>> {
    if !session.path_exists(dir)? {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for name in session.listdir(dir)? {
        if !pattern.is_match(&name) {
            continue;
        }
        let path = format!("{dir}/{name}");
        let Some(content) = session.read_file(&path)? else {
            continue;
        };
        if content.split_whitespace().any(|word| word == needle) {
            found.push(path);
        }
    }
    Ok(found)
}

/// Remove the vhost and wrapper script that belong to a gateway.
///
/// A vhost belongs to the gateway when it routes to the gateway's socket; a
/// script belongs to it when it runs the gateway's entity.
pub fn teardown(host: &Host, entity: &str, socket: Option<&str>) -> Result<Vec<String>> {
    let layout = host.platform().apache();
    let session: &dyn Session = &**host.conn();
    let conf_re = Regex::new(r"^s3gw_.*\.conf$")?;
    let fcgi_re = Regex::new(r"^s3gw_.*\.fcgi$")?;

    let mut doomed = Vec::new();
    if let Some(socket) = socket {
        doomed.extend(matching_files(session, layout.conf_dir, &conf_re, socket)?);
    }
    doomed.extend(matching_files(session, layout.fcgi_dir, &fcgi_re, entity)?);

    for path in &doomed {
        log::info!("{}: deleting {path}", host.hostname());
        session.unlink(path)?;
    }
    Ok(doomed)
}
