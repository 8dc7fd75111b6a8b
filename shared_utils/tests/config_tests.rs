use shared_utils::config::{
    ConfigError, ConfigParser, ConfigSource, Protocol, ProxyKind, TomlConfigParser, VisitorKind,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_load_full_client_config() {
    let mut file = NamedTempFile::new().unwrap();

    let config_str = r#"
        [common]
        server_addr = "tunnel.example.com"
        server_port = 7443
        user = "alice"
        protocol = "kcp"
        token = "shared-token"
        tls_enable = false
        log_file = "/var/log/tunnel/client.log"
        log_level = "warn"
        log_max_days = 7
        dns_server = "1.1.1.1"
        heartbeat_interval = 10
        heartbeat_timeout = 40

        [proxies.ssh]
        type = "tcp"
        local_port = 22
        remote_port = 6022
        use_encryption = true

        [proxies.dns]
        type = "udp"
        local_ip = "10.0.0.53"
        local_port = 53
        remote_port = 6053

        [proxies.secret_db]
        type = "stcp"
        local_port = 5432
        sk = "db-secret"

        [visitors.db]
        type = "stcp"
        server_name = "secret_db"
        sk = "db-secret"
        bind_port = 15432
    "#;

    file.write_all(config_str.as_bytes()).unwrap();

    let source = ConfigSource::Local(file.path().to_path_buf());
    let parsed = TomlConfigParser::new().parse(&source, 0).await.unwrap();

    let common = &parsed.common;
    assert_eq!(common.server_addr, "tunnel.example.com");
    assert_eq!(common.server_port, 7443);
    assert_eq!(common.user, "alice");
    assert_eq!(common.protocol, Protocol::Kcp);
    assert!(!common.tls_enable);
    assert_eq!(common.log_max_days, 7);
    assert_eq!(common.dns_server_addr().unwrap().port(), 53);
    assert!(common.validate().is_ok());

    assert_eq!(parsed.proxies.len(), 3);
    assert_eq!(parsed.proxies["dns"].kind, ProxyKind::Udp);
    assert_eq!(parsed.proxies["dns"].local_ip, "10.0.0.53");
    assert!(parsed.proxies["ssh"].use_encryption);
    assert_eq!(parsed.proxies["secret_db"].sk, "db-secret");

    assert_eq!(parsed.visitors["db"].kind, VisitorKind::Stcp);
    assert_eq!(parsed.visitors["db"].bind_addr, "127.0.0.1");
    assert_eq!(parsed.visitors["db"].bind_port, 15432);
}

#[tokio::test]
async fn test_aux_port_ignored_for_files() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[common]\nserver_addr = \"198.51.100.1\"").unwrap();

    let source = ConfigSource::Local(file.path().to_path_buf());
    let parsed = TomlConfigParser::new().parse(&source, 7001).await.unwrap();

    assert!(parsed.proxies.is_empty());
}

#[tokio::test]
async fn test_missing_file() {
    let source = ConfigSource::from_arg("/nonexistent/client.toml").unwrap();
    let result = TomlConfigParser::new().parse(&source, 0).await;

    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[tokio::test]
async fn test_invalid_proxy_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[proxies.web]\ntype = \"http\"\nlocal_port = 80").unwrap();

    let source = ConfigSource::Local(file.path().to_path_buf());
    let result = TomlConfigParser::new().parse(&source, 0).await;

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { key, .. }) if key == "proxies.web.custom_domains"
    ));
}

#[tokio::test]
async fn test_unknown_protocol_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[common]\nprotocol = \"sctp\"").unwrap();

    let source = ConfigSource::Local(file.path().to_path_buf());
    let result = TomlConfigParser::new().parse(&source, 0).await;

    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}
