//! Application client operations against a scripted HTTP device stub.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::{bind, http_response, not_found, serve};
use pmodial::{ApplicationState, DialClient, DialConfig, DialDevice, DialError};
use pmossdp::DiscoveredDevice;
use url::Url;

fn dial_device(port: u16) -> DialDevice {
    let location = format!("http://127.0.0.1:{port}/dd.xml");
    DialDevice {
        device: DiscoveredDevice::new(
            "uuid:abc::urn:dial-multiscreen-org:service:dial:1".to_string(),
            location,
            "Linux/2.6 UPnP/1.1 appcast_ssdp/1.0".to_string(),
            "urn:dial-multiscreen-org:service:dial:1".to_string(),
            1800,
        ),
        friendly_name: "Living Room TV".to_string(),
        manufacturer: "ACME".to_string(),
        model_name: "Screencaster 3000".to_string(),
        udn: Some("uuid:abc".to_string()),
        application_url: Url::parse(&format!("http://127.0.0.1:{port}/apps/")).unwrap(),
    }
}

#[test]
fn launch_returns_instance_url_and_passes_payload_through() {
    let listener = bind();
    let port = listener.local_addr().unwrap().port();
    let stub = serve(listener, move |req| {
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/apps/YouTube");
        http_response(
            "201 Created",
            &[
                ("Content-Type", "text/plain"),
                (
                    "Location",
                    &format!("http://127.0.0.1:{port}/apps/YouTube/run"),
                ),
            ],
            "",
        )
    });

    let client = DialClient::new(dial_device(stub.addr.port()));
    let instance = client
        .launch("YouTube", Some("v=dQw4w9WgXcQ&t=42"))
        .expect("launch");

    assert_eq!(
        instance.as_ref().map(Url::as_str),
        Some(format!("http://127.0.0.1:{port}/apps/YouTube/run").as_str())
    );
    // The payload is opaque to the client and must arrive byte-for-byte.
    let requests = stub.requests.lock().unwrap();
    assert_eq!(requests[0].body, "v=dQw4w9WgXcQ&t=42");
}

#[test]
fn launch_of_missing_app_is_app_not_installed() {
    let stub = serve(bind(), |_req| not_found());
    let client = DialClient::new(dial_device(stub.addr.port()));
    let err = client.launch("Nonexistent", None).unwrap_err();
    assert!(matches!(err, DialError::AppNotInstalled(_)));
}

#[test]
fn busy_device_without_retries_is_device_busy() {
    let stub = serve(bind(), |_req| {
        http_response("503 Service Unavailable", &[], "")
    });
    let client = DialClient::new(dial_device(stub.addr.port()));
    let err = client.launch("YouTube", None).unwrap_err();
    assert!(matches!(err, DialError::DeviceBusy(_)));
}

#[test]
fn busy_device_with_retries_eventually_launches() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let stub = serve(bind(), move |_req| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            http_response("503 Service Unavailable", &[], "")
        } else {
            http_response("201 Created", &[], "")
        }
    });

    let config = DialConfig {
        busy_retries: 2,
        retry_delay_ms: 10,
        ..DialConfig::default()
    };
    let client = DialClient::with_config(dial_device(stub.addr.port()), config);
    let instance = client.launch("YouTube", None).expect("launch after retry");

    assert_eq!(instance, None); // no Location header in the 201
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn status_reports_state_and_sends_client_dial_version() {
    let stub = serve(bind(), |req| {
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/apps/YouTube?clientDialVer=2.2");
        http_response(
            "200 OK",
            &[("Content-Type", "text/xml")],
            r#"<service xmlns="urn:dial-multiscreen-org:schemas:dial" dialVer="2.2">
  <name>YouTube</name>
  <options allowStop="true"/>
  <state>stopped</state>
</service>"#,
        )
    });

    let client = DialClient::new(dial_device(stub.addr.port()));
    let instance = client.status("YouTube").expect("status");
    assert_eq!(instance.name, "YouTube");
    assert_eq!(instance.state, ApplicationState::Stopped);
    assert_eq!(instance.instance_url, None);
    assert!(instance.allow_stop);
}

#[test]
fn status_of_missing_app_is_app_not_installed() {
    let stub = serve(bind(), |_req| not_found());
    let client = DialClient::new(dial_device(stub.addr.port()));
    let err = client.status("Nonexistent").unwrap_err();
    assert!(matches!(err, DialError::AppNotInstalled(_)));
}

#[test]
fn unparsable_status_body_is_malformed_status() {
    let stub = serve(bind(), |_req| {
        http_response("200 OK", &[("Content-Type", "text/xml")], "not xml")
    });
    let client = DialClient::new(dial_device(stub.addr.port()));
    let err = client.status("YouTube").unwrap_err();
    assert!(matches!(err, DialError::MalformedStatus(_, _)));
}

#[test]
fn stop_deletes_the_instance_url() {
    let stub = serve(bind(), |req| {
        assert_eq!(req.method, "DELETE");
        assert_eq!(req.path, "/apps/YouTube/run");
        http_response("200 OK", &[], "")
    });

    let client = DialClient::new(dial_device(stub.addr.port()));
    let instance =
        Url::parse(&format!("http://127.0.0.1:{}/apps/YouTube/run", stub.addr.port())).unwrap();
    client.stop("YouTube", &instance).expect("stop");
}

#[test]
fn stop_against_unknown_instance_never_silently_succeeds() {
    let stub = serve(bind(), |_req| not_found());
    let client = DialClient::new(dial_device(stub.addr.port()));
    let bogus =
        Url::parse(&format!("http://127.0.0.1:{}/apps/YouTube/made-up", stub.addr.port())).unwrap();
    let err = client.stop("YouTube", &bogus).unwrap_err();
    assert!(matches!(err, DialError::AppNotInstalled(_)));
}

#[test]
fn forbidden_stop_is_operation_not_supported() {
    let stub = serve(bind(), |_req| http_response("403 Forbidden", &[], ""));
    let client = DialClient::new(dial_device(stub.addr.port()));
    let instance =
        Url::parse(&format!("http://127.0.0.1:{}/apps/YouTube/run", stub.addr.port())).unwrap();
    let err = client.stop("YouTube", &instance).unwrap_err();
    assert!(matches!(err, DialError::OperationNotSupported(_)));
}

#[test]
fn hide_posts_to_the_hide_sub_path() {
    let stub = serve(bind(), |req| {
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/apps/YouTube/hide");
        http_response("200 OK", &[], "")
    });
    let client = DialClient::new(dial_device(stub.addr.port()));
    client.hide("YouTube").expect("hide");
}

#[test]
fn hide_not_implemented_is_operation_not_supported() {
    let stub = serve(bind(), |_req| {
        http_response("501 Not Implemented", &[], "")
    });
    let client = DialClient::new(dial_device(stub.addr.port()));
    let err = client.hide("YouTube").unwrap_err();
    assert!(matches!(err, DialError::OperationNotSupported(_)));
}

#[test]
fn supports_stop_reflects_the_allow_stop_option() {
    let stub = serve(bind(), |_req| {
        http_response(
            "200 OK",
            &[("Content-Type", "text/xml")],
            r#"<service><options allowStop="false"/><state>running</state></service>"#,
        )
    });
    let client = DialClient::new(dial_device(stub.addr.port()));
    assert!(!client.supports_stop("YouTube").expect("status"));
}

#[test]
fn dead_device_is_unreachable() {
    // Bind then drop to get a port nothing listens on.
    let port = bind().local_addr().unwrap().port();
    let client = DialClient::new(dial_device(port));
    let err = client.status("YouTube").unwrap_err();
    assert!(matches!(err, DialError::Unreachable { .. }));
}

#[test]
fn invalid_app_names_are_rejected_locally() {
    let port = bind().local_addr().unwrap().port();
    let client = DialClient::new(dial_device(port));
    assert!(matches!(
        client.status("").unwrap_err(),
        DialError::InvalidAppName(_)
    ));
    assert!(matches!(
        client.status("You/Tube").unwrap_err(),
        DialError::InvalidAppName(_)
    ));
}
