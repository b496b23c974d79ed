//! Controller task.
//!
//! Owns the [`WizardController`], applies UI commands to it and emits events for
//! presentation layers. Requests run as spawned tasks that report back over a
//! channel, so the loop keeps taking commands while one is in flight. Catalog
//! searches may overlap; other requests run one at a time and are aborted when
//! the controller abandons them.

use super::controller::{RemoteOp, RemoteReply, SearchRequest, WizardController};
use super::search::{Debouncer, Ticket};
use super::WizardError;
use crate::api::{CatalogApi, RequestError};
use crate::model::{Action, CatalogItem, Notice, ReferenceKind, WizardEvent};
use crate::product::ProductDraft;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Authenticate(String),
    LookupCustomer(String),
    ClearCustomer,
    ContinueWithCustomer,
    SkipCustomer,
    ReloadReferences,
    SelectReference { kind: ReferenceKind, id: i64 },
    ProceedToGoods,
    SearchInput(String),
    AddToCart(i64),
    AdjustQuantity { item_id: i64, delta: i64 },
    RemoveFromCart(i64),
    ProceedToConfirm,
    Back,
    Submit { finalize: bool },
    PublishProduct(Box<ProductDraft>),
    Logout,
    Quit,
}

struct SearchDone {
    ticket: Ticket,
    result: Result<Vec<CatalogItem>, RequestError>,
}

struct OpDone {
    ticket: Ticket,
    reply: RemoteReply,
}

struct InFlight {
    ticket: Ticket,
    action: Action,
    handle: JoinHandle<()>,
}

enum Flow {
    Continue,
    Quit,
}

struct Runner<A> {
    controller: WizardController<A>,
    event_tx: UnboundedSender<WizardEvent>,
    search_tx: UnboundedSender<SearchDone>,
    op_tx: UnboundedSender<OpDone>,
    in_flight: Option<InFlight>,
    searches_in_flight: usize,
    debouncer: Debouncer,
}

/// Run the controller until the UI quits or drops its command sender.
pub(crate) async fn run_controller<A: CatalogApi + 'static>(
    controller: WizardController<A>,
    debounce: Duration,
    event_tx: UnboundedSender<WizardEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (search_tx, mut search_rx) = mpsc::unbounded_channel::<SearchDone>();
    let (op_tx, mut op_rx) = mpsc::unbounded_channel::<OpDone>();
    let mut runner = Runner {
        controller,
        event_tx,
        search_tx,
        op_tx,
        in_flight: None,
        searches_in_flight: 0,
        debouncer: Debouncer::new(debounce),
    };
    runner.emit_snapshot();

    loop {
        let deadline = runner.debouncer.deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if let Flow::Quit = runner.handle(cmd) {
                    break;
                }
            }
            Some(done) = op_rx.recv() => {
                runner.finish_op(done);
            }
            Some(done) = search_rx.recv() => {
                runner.finish_search(done);
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => futures::future::pending().await,
                }
            } => {
                if let Some(query) = runner.debouncer.take_due(Instant::now()) {
                    runner.start_search(query);
                }
            }
        }
    }

    if let Some(op) = runner.in_flight.take() {
        op.handle.abort();
    }
    tracing::debug!("controller loop finished");
    Ok(())
}

impl<A: CatalogApi + 'static> Runner<A> {
    fn handle(&mut self, cmd: UiCommand) -> Flow {
        let outcome: Result<Option<Notice>, WizardError> = match cmd {
            UiCommand::Quit => return Flow::Quit,
            UiCommand::Authenticate(token) => self
                .controller
                .authenticate(&token)
                .map(|op| self.spawn_op(op)),
            UiCommand::LookupCustomer(phone) => self
                .controller
                .lookup_customer(&phone)
                .map(|op| self.spawn_op(op)),
            UiCommand::ClearCustomer => self.controller.clear_customer().map(|_| None),
            UiCommand::ContinueWithCustomer => self
                .controller
                .continue_with_customer()
                .map(|op| self.spawn_op(op)),
            UiCommand::SkipCustomer => self.controller.skip_customer().map(|op| self.spawn_op(op)),
            UiCommand::ReloadReferences => self
                .controller
                .load_references()
                .map(|op| self.spawn_op(op)),
            UiCommand::SelectReference { kind, id } => {
                self.controller.select_reference(kind, id).map(|_| None)
            }
            UiCommand::ProceedToGoods => self.controller.proceed_to_goods().map(|req| {
                self.debouncer.cancel();
                self.spawn_search(req);
                None
            }),
            UiCommand::SearchInput(text) => {
                self.controller.set_search_query(text.clone()).map(|_| {
                    self.debouncer.schedule(text, Instant::now());
                    None
                })
            }
            UiCommand::AddToCart(id) => self.controller.add_to_cart(id).map(|_| None),
            UiCommand::AdjustQuantity { item_id, delta } => self
                .controller
                .adjust_quantity(item_id, delta)
                .map(|_| None),
            UiCommand::RemoveFromCart(id) => self.controller.remove_from_cart(id).map(|_| None),
            UiCommand::ProceedToConfirm => self.controller.proceed_to_confirm().map(|_| None),
            UiCommand::Back => self.controller.back().map(|_| {
                self.debouncer.cancel();
                None
            }),
            UiCommand::Submit { finalize } => {
                self.controller.submit(finalize).map(|op| self.spawn_op(op))
            }
            UiCommand::PublishProduct(product) => self
                .controller
                .publish_product(*product)
                .map(|op| self.spawn_op(op)),
            UiCommand::Logout => {
                self.debouncer.cancel();
                Ok(Some(self.controller.logout()))
            }
        };

        self.reap_abandoned();
        match outcome {
            Ok(Some(notice)) => self.notify(notice),
            Ok(None) => {}
            Err(WizardError::Busy(action)) => {
                tracing::debug!(?action, "command rejected while busy");
                self.notify(Notice::info(format!("Please wait: {}…", action.label())));
            }
            Err(e) => self.report(e),
        }
        self.emit_snapshot();
        Flow::Continue
    }

    fn spawn_op(&mut self, op: RemoteOp) -> Option<Notice> {
        self.reap_abandoned();
        let api = self.controller.api();
        let tx = self.op_tx.clone();
        let RemoteOp {
            ticket,
            action,
            call,
        } = op;
        self.set_busy(action, true);
        let handle = tokio::spawn(async move {
            let reply = call.run(api.as_ref()).await;
            let _ = tx.send(OpDone { ticket, reply });
        });
        self.in_flight = Some(InFlight {
            ticket,
            action,
            handle,
        });
        None
    }

    /// Abort the request task once the controller no longer waits on it.
    fn reap_abandoned(&mut self) {
        let pending = self.controller.pending().map(|op| op.ticket);
        if self.in_flight.as_ref().map(|op| op.ticket) == pending {
            return;
        }
        if let Some(op) = self.in_flight.take() {
            tracing::debug!(action = ?op.action, "aborting abandoned request");
            op.handle.abort();
            self.set_busy(op.action, false);
        }
    }

    fn finish_op(&mut self, done: OpDone) {
        let mut action = None;
        if self.in_flight.as_ref().is_some_and(|op| op.ticket == done.ticket) {
            if let Some(op) = self.in_flight.take() {
                self.set_busy(op.action, false);
                action = Some(op.action);
            }
        }
        match self.controller.complete(done.ticket, done.reply) {
            Ok(Some(notice)) => {
                if action == Some(Action::CreateProduct) {
                    let _ = self.event_tx.send(WizardEvent::ProductPublished);
                }
                self.notify(notice);
                self.emit_snapshot();
            }
            Ok(None) => {}
            Err(e) => {
                self.report(e);
                self.emit_snapshot();
            }
        }
    }

    fn start_search(&mut self, query: String) {
        match self.controller.issue_search(query) {
            Ok(req) => self.spawn_search(req),
            Err(e) => tracing::debug!(error = %e, "debounced search dropped"),
        }
    }

    fn spawn_search(&mut self, req: SearchRequest) {
        let api = self.controller.api();
        let tx = self.search_tx.clone();
        if self.searches_in_flight == 0 {
            self.set_busy(Action::Search, true);
        }
        self.searches_in_flight += 1;
        // Superseded searches still run to completion; their results are dropped on arrival.
        tokio::spawn(async move {
            let result = api.search_catalog(&req.token, req.query.as_deref()).await;
            let _ = tx.send(SearchDone {
                ticket: req.ticket,
                result,
            });
        });
    }

    fn finish_search(&mut self, done: SearchDone) {
        self.searches_in_flight = self.searches_in_flight.saturating_sub(1);
        if self.searches_in_flight == 0 {
            self.set_busy(Action::Search, false);
        }
        match self.controller.apply_search(done.ticket, done.result) {
            Ok(true) => self.emit_snapshot(),
            Ok(false) => {}
            Err(e) => {
                self.report(e);
                self.emit_snapshot();
            }
        }
    }

    fn set_busy(&self, action: Action, busy: bool) {
        let _ = self.event_tx.send(WizardEvent::Busy { action, busy });
    }

    fn report(&self, e: WizardError) {
        tracing::warn!(error = %e, "wizard operation failed");
        let expired = matches!(
            &e,
            WizardError::Remote { action, source }
                if *action != Action::Authenticate && source.status() == Some(401)
        );
        let mut message = e.to_string();
        if expired {
            message.push_str(" (token rejected; Ctrl-L to sign in again)");
        }
        self.notify(Notice::error(message));
    }

    fn notify(&self, notice: Notice) {
        let _ = self.event_tx.send(WizardEvent::Notice(notice));
    }

    fn emit_snapshot(&self) {
        let _ = self
            .event_tx
            .send(WizardEvent::Snapshot(Box::new(self.controller.snapshot())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TableCrmClient;
    use crate::model::Step;
    use crate::session::Session;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::get,
        Router,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Mock API where searching for "slow" takes longer than any other query.
    /// Token "hang" is accepted too, but then the accounts list never arrives.
    /// Every POST succeeds.
    async fn spawn_api() -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().route(
            "/api/v1/:collection/",
            get(
                |Path(collection): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    let token = q.get("token").map(String::as_str);
                    if !matches!(token, Some("good") | Some("hang")) {
                        return (StatusCode::UNAUTHORIZED, String::from("bad token"));
                    }
                    if token == Some("hang") && collection == "payboxes" {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    let body = match collection.as_str() {
                        "nomenclature" => match q.get("search").map(String::as_str) {
                            Some("slow") => {
                                tokio::time::sleep(Duration::from_millis(300)).await;
                                r#"[{"id":1,"name":"slow result"}]"#.to_string()
                            }
                            Some(s) => format!(r#"[{{"id":2,"name":"{s} result","price":5}}]"#),
                            None => r#"[{"id":3,"name":"everything","price":10}]"#.to_string(),
                        },
                        "contragents" => "[]".to_string(),
                        other => format!(r#"{{"results":[{{"id":1,"name":"{other}"}}]}}"#),
                    };
                    (StatusCode::OK, body)
                },
            )
            .post(|| async { (StatusCode::OK, r#"[{"id":5}]"#) }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/api/v1")
    }

    struct Harness {
        _dir: tempfile::TempDir,
        cmd_tx: UnboundedSender<UiCommand>,
        event_rx: UnboundedReceiver<WizardEvent>,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    impl Harness {
        async fn start(debounce: Duration) -> Self {
            let base = spawn_api().await;
            let dir = tempfile::tempdir().unwrap();
            let api = TableCrmClient::new(&base, "test", None).unwrap();
            let controller =
                WizardController::new(Arc::new(api), Session::new(dir.path().join("token")));
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_controller(controller, debounce, event_tx, cmd_rx));
            Self {
                _dir: dir,
                cmd_tx,
                event_rx,
                handle,
            }
        }

        fn send(&self, cmd: UiCommand) {
            self.cmd_tx.send(cmd).unwrap();
        }

        /// Wait for the first snapshot matching `pred`.
        async fn snapshot_where(
            &mut self,
            pred: impl Fn(&crate::model::WizardSnapshot) -> bool,
        ) -> crate::model::WizardSnapshot {
            let deadline = Duration::from_secs(5);
            tokio::time::timeout(deadline, async {
                loop {
                    match self.event_rx.recv().await {
                        Some(WizardEvent::Snapshot(s)) if pred(&s) => return *s,
                        Some(_) => continue,
                        None => panic!("controller stopped"),
                    }
                }
            })
            .await
            .expect("timed out waiting for snapshot")
        }

        async fn notice_where(&mut self, pred: impl Fn(&Notice) -> bool) -> Notice {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    match self.event_rx.recv().await {
                        Some(WizardEvent::Notice(n)) if pred(&n) => return n,
                        Some(_) => continue,
                        None => panic!("controller stopped"),
                    }
                }
            })
            .await
            .expect("timed out waiting for notice")
        }
    }

    #[tokio::test]
    async fn walks_to_goods_and_loads_initial_catalog() {
        let mut h = Harness::start(Duration::from_millis(50)).await;
        h.send(UiCommand::Authenticate("good".into()));
        h.snapshot_where(|s| s.step == Step::Client).await;

        h.send(UiCommand::LookupCustomer("+79990001112".into()));
        let n = h
            .notice_where(|n| n.message.starts_with("No customer"))
            .await;
        assert_eq!(n.level, crate::model::NoticeLevel::Warning);

        h.send(UiCommand::SkipCustomer);
        let s = h
            .snapshot_where(|s| s.step == Step::Details && s.selections.is_complete())
            .await;
        assert_eq!(s.references.warehouses[0].name, "warehouses");

        h.send(UiCommand::ProceedToGoods);
        let s = h.snapshot_where(|s| !s.catalog.is_empty()).await;
        assert_eq!(s.catalog[0].name, "everything");

        h.send(UiCommand::Quit);
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn latest_search_wins_over_slower_earlier_one() {
        let mut h = Harness::start(Duration::from_millis(20)).await;
        h.send(UiCommand::Authenticate("good".into()));
        h.snapshot_where(|s| s.step == Step::Client).await;
        h.send(UiCommand::SkipCustomer);
        h.snapshot_where(|s| s.selections.is_complete()).await;
        h.send(UiCommand::ProceedToGoods);
        h.snapshot_where(|s| s.catalog.iter().any(|i| i.name == "everything"))
            .await;

        h.send(UiCommand::SearchInput("slow".into()));
        // Let the slow search get issued before typing on.
        tokio::time::sleep(Duration::from_millis(80)).await;
        h.send(UiCommand::SearchInput("fast".into()));

        let s = h
            .snapshot_where(|s| s.catalog.iter().any(|i| i.name == "fast result"))
            .await;
        assert_eq!(s.search_query, "fast");

        // Give the slow response time to arrive; it must be dropped.
        tokio::time::sleep(Duration::from_millis(400)).await;
        h.send(UiCommand::Back);
        let s = h.snapshot_where(|s| s.step == Step::Details).await;
        assert!(s.catalog.iter().all(|i| i.name != "slow result"));

        h.send(UiCommand::Quit);
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn logout_during_hung_reference_load_returns_to_auth() {
        let mut h = Harness::start(Duration::from_millis(20)).await;
        h.send(UiCommand::Authenticate("hang".into()));
        h.snapshot_where(|s| s.step == Step::Client).await;

        // The step changes before the lists arrive.
        h.send(UiCommand::SkipCustomer);
        let s = h.snapshot_where(|s| s.step == Step::Details).await;
        assert!(s.references.payboxes.is_empty());

        h.send(UiCommand::Logout);
        let n = h.notice_where(|n| n.message.starts_with("Signed out")).await;
        assert_eq!(n.level, crate::model::NoticeLevel::Info);
        let s = h.snapshot_where(|_| true).await;
        assert_eq!(s.step, Step::Auth);
        assert!(!h._dir.path().join("token").exists());

        h.send(UiCommand::Quit);
        tokio::time::timeout(Duration::from_secs(5), h.handle)
            .await
            .expect("controller stopped")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn only_remote_commands_wait_for_a_request() {
        let mut h = Harness::start(Duration::from_millis(20)).await;
        h.send(UiCommand::Authenticate("hang".into()));
        h.snapshot_where(|s| s.step == Step::Client).await;
        h.send(UiCommand::SkipCustomer);
        h.snapshot_where(|s| s.step == Step::Details).await;

        h.send(UiCommand::ReloadReferences);
        let n = h.notice_where(|n| n.message.starts_with("Please wait")).await;
        assert!(n.message.contains("loading references"));

        // Stepping back is still handled and drops the load.
        h.send(UiCommand::Back);
        let mut busy_cleared = false;
        let s = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match h.event_rx.recv().await {
                    Some(WizardEvent::Busy {
                        action: Action::LoadReferences,
                        busy: false,
                    }) => busy_cleared = true,
                    Some(WizardEvent::Snapshot(s)) if s.step == Step::Client => return *s,
                    Some(_) => continue,
                    None => panic!("controller stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for snapshot");
        assert!(busy_cleared);
        assert_eq!(s.customer, Some(crate::model::CustomerChoice::Skipped));

        h.send(UiCommand::Quit);
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn published_product_is_announced() {
        let mut h = Harness::start(Duration::from_millis(20)).await;
        h.send(UiCommand::Authenticate("good".into()));
        h.snapshot_where(|s| s.step == Step::Client).await;

        h.send(UiCommand::PublishProduct(Box::new(ProductDraft {
            name: "Lamp".into(),
            code: "L-1".into(),
            ..Default::default()
        })));
        let mut announced = false;
        let n = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match h.event_rx.recv().await {
                    Some(WizardEvent::ProductPublished) => announced = true,
                    Some(WizardEvent::Notice(n)) if n.message.contains("Lamp") => return n,
                    Some(_) => continue,
                    None => panic!("controller stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for notice");
        assert!(announced);
        assert_eq!(n.level, crate::model::NoticeLevel::Success);

        h.send(UiCommand::Quit);
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_token_keeps_auth_and_reports_error() {
        let mut h = Harness::start(Duration::from_millis(20)).await;
        h.send(UiCommand::Authenticate("nope".into()));
        let n = h
            .notice_where(|n| n.level == crate::model::NoticeLevel::Error)
            .await;
        assert!(n.message.contains("401"));
        let s = h.snapshot_where(|_| true).await;
        assert_eq!(s.step, Step::Auth);
        drop(h.cmd_tx);
        h.handle.await.unwrap().unwrap();
    }
}
