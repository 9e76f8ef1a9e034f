//! Game-server payload: installation plan, agreement and access-control
//! files, service configuration and the remote commands that operate on them.
//!
//! Pure functions only — no I/O, no async.

use std::collections::BTreeMap;

use crate::domain::shell::quote;

/// Canonical name of the world directory on the instance.
pub const WORLD_DIR: &str = "world";

/// Agreement file the server refuses to start without.
pub const AGREEMENT_FILE: &str = "eula.txt";

/// Access-control file listing the permitted players.
pub const ALLOW_LIST_FILE: &str = "whitelist.json";

/// Service configuration file.
pub const PROPERTIES_FILE: &str = "server.properties";

const NONINTERACTIVE: &str = "export DEBIAN_FRONTEND=noninteractive";

/// Default service configuration. Key order is preserved when rendering.
const BASE_PROPERTIES: &[(&str, &str)] = &[
    ("enable-jmx-monitoring", "false"),
    ("rcon.port", "25575"),
    ("level-seed", ""),
    ("gamemode", "survival"),
    ("enable-command-block", "false"),
    ("enable-query", "false"),
    ("generator-settings", "{}"),
    ("enforce-secure-profile", "true"),
    ("level-name", WORLD_DIR),
    ("motd", "A Minecraft Server"),
    ("query.port", "25565"),
    ("pvp", "true"),
    ("generate-structures", "true"),
    ("max-chained-neighbor-updates", "1000000"),
    ("difficulty", "hard"),
    ("network-compression-threshold", "256"),
    ("max-tick-time", "60000"),
    ("require-resource-pack", "false"),
    ("use-native-transport", "true"),
    ("max-players", "20"),
    ("online-mode", "true"),
    ("enable-status", "true"),
    ("allow-flight", "false"),
    ("initial-disabled-packs", ""),
    ("broadcast-rcon-to-ops", "true"),
    ("view-distance", "16"),
    ("server-ip", ""),
    ("resource-pack-prompt", ""),
    ("allow-nether", "true"),
    ("server-port", "25565"),
    ("enable-rcon", "false"),
    ("sync-chunk-writes", "true"),
    ("op-permission-level", "4"),
    ("prevent-proxy-connections", "false"),
    ("hide-online-players", "false"),
    ("resource-pack", ""),
    ("entity-broadcast-range-percentage", "500"),
    ("simulation-distance", "10"),
    ("rcon.password", ""),
    ("player-idle-timeout", "0"),
    ("force-gamemode", "false"),
    ("rate-limit", "0"),
    ("hardcore", "true"),
    ("white-list", "true"),
    ("broadcast-console-to-ops", "true"),
    ("spawn-npcs", "true"),
    ("spawn-animals", "true"),
    ("function-permission-level", "2"),
    ("initial-enabled-packs", "vanilla,fabric"),
    ("level-type", "minecraft\\:normal"),
    ("text-filtering-config", ""),
    ("spawn-monsters", "true"),
    ("enforce-whitelist", "true"),
    ("spawn-protection", "16"),
    ("resource-pack-sha1", ""),
    ("max-world-size", "29999984"),
];

// ── Installation plan ────────────────────────────────────────────────────────

/// What one installation step does on the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Run a shell command; a non-zero exit fails the step.
    Run(String),
    /// Overwrite a file with the given contents.
    Write { path: String, contents: String },
}

/// One labelled step of the installation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub label: &'static str,
    pub action: StepAction,
}

/// File name of the installer artifact, taken from the last URL segment.
#[must_use]
pub fn installer_artifact(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Ordered steps that provision the runtime and server software.
#[must_use]
pub fn installation_plan(installer_url: &str, allow_list: &[String]) -> Vec<InstallStep> {
    let artifact = installer_artifact(installer_url);
    vec![
        InstallStep {
            label: "updating instance",
            action: StepAction::Run(format!(
                "{NONINTERACTIVE} && apt-get update && apt-get upgrade -y"
            )),
        },
        InstallStep {
            label: "installing Java and pigz",
            action: StepAction::Run(format!(
                "{NONINTERACTIVE} && apt-get install -y openjdk-17-jre-headless pigz"
            )),
        },
        InstallStep {
            label: "downloading server installer",
            action: StepAction::Run(format!(
                "wget -q -O {} {}",
                quote(artifact),
                quote(installer_url)
            )),
        },
        InstallStep {
            label: "installing server",
            action: StepAction::Run(format!(
                "java -jar {} server -downloadMinecraft",
                quote(artifact)
            )),
        },
        InstallStep {
            label: "accepting EULA",
            action: StepAction::Write {
                path: AGREEMENT_FILE.to_owned(),
                contents: agreement_file(),
            },
        },
        InstallStep {
            label: "setting whitelist",
            action: StepAction::Write {
                path: ALLOW_LIST_FILE.to_owned(),
                contents: render_allow_list(allow_list),
            },
        },
    ]
}

/// Contents of the agreement file with the acceptance marker.
#[must_use]
pub fn agreement_file() -> String {
    "eula=true\n".to_owned()
}

/// Render the access-control file: a JSON array of player names.
///
/// Duplicates are dropped, first occurrence wins, order is preserved.
#[must_use]
pub fn render_allow_list(names: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| seen.insert(*n))
        .collect();
    let mut out = serde_json::Value::from(unique).to_string();
    out.push('\n');
    out
}

// ── Service configuration ────────────────────────────────────────────────────

/// Render `server.properties`, applying `overrides` on top of the defaults.
///
/// Known keys keep their default position; unknown override keys are
/// appended in sorted order.
#[must_use]
pub fn render_properties(overrides: &BTreeMap<String, String>) -> String {
    let mut out = String::from("#Minecraft server properties\n");
    for (key, default) in BASE_PROPERTIES {
        let value = overrides.get(*key).map_or(*default, String::as_str);
        out.push_str(&format!("{key}={value}\n"));
    }
    for (key, value) in overrides {
        if !BASE_PROPERTIES.iter().any(|(k, _)| k == key) {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}

// ── Remote commands ──────────────────────────────────────────────────────────

/// Extract a gzip tar archive with `pigz`, which the installation task provides.
#[must_use]
pub fn extract_command(archive: &str) -> String {
    format!("tar --use-compress-program=pigz -xf {}", quote(archive))
}

/// Rename the extracted payload directory to the canonical world name.
#[must_use]
pub fn rename_command(extracted: &str) -> String {
    format!("mv -T -- {} {}", quote(extracted), quote(WORLD_DIR))
}

#[must_use]
pub fn remove_command(path: &str) -> String {
    format!("rm -f -- {}", quote(path))
}

/// Compress the world directory at maximum compression for backup.
#[must_use]
pub fn backup_command(archive: &str) -> String {
    format!(
        "tar --use-compress-program='pigz -9' -cf {} {}",
        quote(archive),
        quote(WORLD_DIR)
    )
}

#[must_use]
pub fn size_command(path: &str) -> String {
    format!("stat -c %s -- {}", quote(path))
}

/// Launch the server in the foreground so its stdin accepts console commands.
#[must_use]
pub fn launch_command(memory: &str, jar: &str) -> String {
    format!("java -Xmx{memory} -jar {} nogui", quote(jar))
}

/// Console command that makes the server save and exit.
pub const STOP_COMMAND: &str = "stop";
