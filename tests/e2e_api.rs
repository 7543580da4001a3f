use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strest_worker::communication::{
    ClientSender, Connector, Message, NullSender, Receiver, Sender, ServerReceiver,
};
use strest_worker::error::AppResult;
use strest_worker::process::{
    ExitReason, LifecycleConfig, ProcessController, RunContext, TestRegistry, Workload,
};

const SIGNAL_GAP: Duration = Duration::from_millis(300);

fn loopback_receiver() -> Result<(ServerReceiver, Connector), String> {
    let receiver = ServerReceiver::bind_to("127.0.0.1", 0)
        .map_err(|err| format!("bind receiver failed: {}", err))?;
    let connector = Connector::new("127.0.0.1", receiver.local_addr().port());
    Ok((receiver, connector))
}

#[test]
fn e2e_api_messages_from_one_client_arrive_in_order() -> Result<(), String> {
    let (receiver, connector) = loopback_receiver()?;
    let mut sender =
        ClientSender::connect(&connector).map_err(|err| format!("connect failed: {}", err))?;

    sender
        .send_batch(vec![Message::Start, Message::Reset, Message::Stop])
        .map_err(|err| format!("send failed: {}", err))?;

    for expected in [Message::Start, Message::Reset, Message::Stop] {
        match receiver.wait_for_message() {
            Ok(Some(message)) if message == expected => {}
            other => return Err(format!("expected {:?}, got {:?}", expected, other)),
        }
    }

    sender.shutdown();
    receiver.shutdown();
    match receiver.wait_for_message() {
        Ok(None) => Ok(()),
        other => Err(format!("expected no message after shutdown, got {:?}", other)),
    }
}

#[test]
fn e2e_api_controller_obeys_signals_over_loopback() -> Result<(), String> {
    let (receiver, connector) = loopback_receiver()?;

    let config = LifecycleConfig {
        worker_id: "api-worker".to_owned(),
        threads: 2,
        report_interval: Duration::from_millis(50),
        wait_for_start: true,
        ..LifecycleConfig::default()
    };
    let workload = |_thread_id: usize| -> AppResult<Box<dyn Workload>> {
        Ok(Box::new(|ctx: &RunContext<'_>| -> AppResult<()> {
            ctx.shutdown.sleep(Duration::from_millis(5));
            Ok(())
        }))
    };
    let mut controller = ProcessController::new(
        config,
        Arc::new(workload),
        Arc::new(TestRegistry::new()),
        Box::new(NullSender),
    );
    controller
        .listen_to(Arc::new(receiver))
        .map_err(|err| format!("listen failed: {}", err))?;
    let run = thread::spawn(move || controller.run());

    let mut sender =
        ClientSender::connect(&connector).map_err(|err| format!("connect failed: {}", err))?;
    sender
        .send(Message::Start)
        .map_err(|err| format!("send start failed: {}", err))?;
    thread::sleep(SIGNAL_GAP);
    sender
        .send(Message::Stop)
        .map_err(|err| format!("send stop failed: {}", err))?;

    let reason = run
        .join()
        .map_err(|_err| "controller thread panicked".to_owned())?
        .map_err(|err| format!("controller failed: {}", err))?;
    sender.shutdown();
    if reason != ExitReason::StopRequested || reason.code() != 18 {
        return Err(format!("expected stop requested, got {}", reason));
    }
    Ok(())
}
