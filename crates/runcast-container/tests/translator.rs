// End-to-end checks of the translator against the formats container tooling
// actually prints and accepts.

use std::collections::BTreeMap;

use runcast_container::{
    editor::ContainerEditor, import_env, needs_recreation, ports::normalize_ports,
    translate::parse_inspect, ContainerInfo, PortMapping, RestartPolicy, MAX_ENV_ENTRIES,
};

#[test]
fn both_port_shapes_agree() {
    let discovered = PortMapping::parse("80/tcp -> 0.0.0.0:8080").unwrap();
    let installed = PortMapping::parse("8080:80/tcp").unwrap();

    assert_eq!(discovered, installed);
    assert_eq!(discovered.host_port, "8080");
    assert_eq!(discovered.container_port, "80");
    assert_eq!(discovered.protocol, "tcp");
    assert_eq!(discovered.to_spec().as_deref(), Some("8080:80/tcp"));
}

#[test]
fn env_import_scenario() {
    let mut env = BTreeMap::from([("EXISTING".to_string(), "yes".to_string())]);
    let text = "FOO=bar\n# comment\n\nLD_PRELOAD=/tmp/hook.so\n";

    let report = import_env(text, &mut env);

    assert_eq!(report.imported, 1);
    assert_eq!(env.len(), 2);
    assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
    assert_eq!(env.get("EXISTING").map(String::as_str), Some("yes"));
    assert!(!env.contains_key("LD_PRELOAD"));
}

#[test]
fn env_import_cap_and_idempotence() {
    let text: String = (0..2_000).map(|i| format!("VAR{i}=value\n")).collect();
    let mut env = BTreeMap::new();

    import_env(&text, &mut env);
    assert_eq!(env.len(), MAX_ENV_ENTRIES);

    let before = env.clone();
    import_env(&text, &mut env);
    assert_eq!(env, before);
}

#[test]
fn discovered_container_edit_flow() {
    // A container discovered from the runtime, edited only in its restart
    // policy, can be updated in place; touching the image cannot.
    let json = r#"[{
        "Id": "c0ffee",
        "Name": "/worker",
        "State": {"Status": "exited", "Running": false},
        "Config": {"Image": "acme/worker:1", "Env": ["QUEUE=default"], "Cmd": ["run"]},
        "HostConfig": {"RestartPolicy": {"Name": "no"}, "Binds": ["/srv/q:/q"]},
        "NetworkSettings": {"Ports": {"9000/tcp": [{"HostIp": "127.0.0.1", "HostPort": "19000"}]}}
    }]"#;
    let records = parse_inspect(json).unwrap();
    let discovered = ContainerInfo::from_inspect(&records[0]);
    assert_eq!(discovered.ports, vec!["19000:9000/tcp"]);

    let mut editor = ContainerEditor::from_info(&discovered);
    editor.restart_policy = RestartPolicy::OnFailure;
    let policy_only = editor.build();
    assert!(!needs_recreation(&discovered, &policy_only));

    editor.image = "acme/worker:2".to_string();
    let new_image = editor.build();
    assert!(needs_recreation(&discovered, &new_image));
}

#[test]
fn normalized_ports_feed_run_args() {
    let mut info = ContainerInfo::new("traefik:v3");
    info.ports = normalize_ports(&["443/tcp -> [::]:443", "80:80", "broken:port:spec"]);
    let args = info.run_args(&[]);

    let published: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "-p")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(published, vec!["443:443/tcp", "80:80/tcp"]);
}
