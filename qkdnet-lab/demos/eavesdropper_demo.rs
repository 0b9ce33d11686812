use qkdnet_lab::config::{Config, HardwareMode};
use qkdnet_lab::service::LabService;
use qkdnet_telemetry::TelemetryHandle;

#[tokio::main]
async fn main() {
    for eavesdropper in [false, true] {
        let mut cfg = Config::sample();
        cfg.lab.key_length = 512;
        cfg.lab.eavesdropper = eavesdropper;
        cfg.hardware.mode = HardwareMode::Loopback;
        let telemetry = TelemetryHandle::from_config(cfg.telemetry.clone());
        let mut service = LabService::new(&cfg, telemetry.clone()).expect("sample config is valid");
        let report = service.run_iteration(1).await.expect("local run succeeds");

        println!(
            "[qkdnet-lab] eve={} status={} qber={:.3} sifted={} delivered={}",
            eavesdropper, report.status, report.qber, report.sifted_length, report.messages_delivered
        );
        if let Some(verification) = &report.verification {
            println!("[qkdnet-lab] verification={verification:?}");
        }
        println!("[qkdnet-lab] counters={:?}", telemetry.flush().counters);
    }
}
