use clap::Parser;
use std::path::PathBuf;

/// Environment variable reference, shown by `--help` and on configuration errors.
pub const CONFIG_HELP: &str = "\
Required environment variables:
  FILES_REST_API          - Host name of the file-storage REST endpoint
  CONTAINER               - File container id (sent as x-sap-filecontainer)
  CRT_PATH                - Path to the PEM client certificate
  KEY_PATH                - Path to the PEM client private key

Optional environment variables:
  NUM_REQUESTS            - Measured requests per test kind, up to 10000000 (default: 1000)
  API_PORT                - HTTPS port (default: 443)
  OUTPUT_PATH             - Report path; a timestamp is added (default: /data/results.json)
  TEST_TYPE               - whoami, file_open or both (default: whoami)
  FILE_PATH               - File to open; required for file_open and both
  REQUEST_TIMEOUT         - Per-request timeout: 500ms, 30s, 2m (default: 30s)
  MAX_BODY_BYTES          - Response bytes kept per request (default: 4096)
  DEBUG                   - Per-request debug logging, true/yes/1 or false/no/0 (default: false)
  INSECURE_SKIP_VERIFY    - Skip server certificate and hostname checks, true/false (default: false)
  CONFIG_FILE             - JSON file filling any variable not set (default: /config/config.json)
  RUST_LOG                - Overrides the log filter";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "webhdfs-latency",
    version,
    about = "Measures WebHDFS WHOAMI / OPEN latency over client-certificate TLS",
    after_help = CONFIG_HELP
)]
pub struct Cli {
    /// Path to a JSON config file (overrides CONFIG_FILE)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
