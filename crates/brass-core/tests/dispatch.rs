//! End-to-end dispatch behavior over the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use brass_core::prelude::*;
use brass_core::testing::{MemoryTransport, test_bot};
use brass_core::{Bot, Identity, ModuleLoadError, normalize};
use tokio_test::{assert_err, assert_ok};

fn counter_command(name: &str, occlusion: Occlusion, hits: &Arc<AtomicUsize>) -> Command {
    let hits = Arc::clone(hits);
    Command::builder(name)
        .occlusion(occlusion)
        .handler(move |_, _, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap()
}

fn names(bot: &Bot) -> Vec<String> {
    bot.registry()
        .all_commands()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

#[test]
fn greeting_fires_once_and_occludes_lower_priority() {
    let (bot, transport) = test_bot(MemoryTransport::default());
    let fallback_hits = Arc::new(AtomicUsize::new(0));

    let greet = Command::builder("say hello")
        .rule("hi $@bot!")
        .occlusion(Occlusion::Exclusive)
        .handler(|ctx, _, _| {
            ctx.reply("hello there")?;
            Ok(())
        })
        .build()
        .unwrap();
    let fallback = Command::builder("fallback")
        .rule(RuleSpec::Any)
        .priority(-10)
        .occlusion(Occlusion::Exclusive)
        .handler({
            let hits = Arc::clone(&fallback_hits);
            move |_, _, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    assert_ok!(bot.registry().register(
        "greetings",
        vec![Arc::new(greet), Arc::new(fallback)]
    ));

    let dispatcher = Dispatcher::new(Arc::clone(&bot));
    for text in ["hi @brassbot!", "hi <@U42>!"] {
        let report = dispatcher.dispatch(Event::message(text).with("channel", "C1"));
        assert_eq!(report.fired, ["say hello"]);
    }

    assert_eq!(transport.sent_texts(), ["hello there", "hello there"]);
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 0);

    dispatcher.dispatch(Event::message("something else").with("channel", "C1"));
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn fragment_rules_tolerate_whitespace() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let store = Arc::clone(&seen);
    let bomb = Command::builder("bomb")
        .rule(["$@bot", r"([\w ]+?)", r"bomb(?: (\d+))?$"])
        .occlusion(Occlusion::Exclusive)
        .handler(move |_, _, caps| {
            store
                .lock()
                .push((caps.get(0).map(str::to_string), caps.get(1).map(str::to_string)));
            Ok(())
        })
        .build()
        .unwrap();
    bot.registry().add_command("bomb", Arc::new(bomb)).unwrap();

    let dispatcher = Dispatcher::new(bot);
    dispatcher.dispatch(Event::message("<@U42>:   cat  \t bomb 3"));
    dispatcher.dispatch(Event::message("@brassbot dog bomb"));
    dispatcher.dispatch(Event::message("cat bomb"));

    let seen = seen.lock();
    assert_eq!(
        *seen,
        [
            (Some("cat".to_string()), Some("3".to_string())),
            (Some("dog".to_string()), None),
        ]
    );
}

#[test]
fn identity_change_recompiles_rules() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in = Arc::clone(&hits);
    let ping = Command::builder("ping")
        .rule("$bot ping")
        .occlusion(Occlusion::Exclusive)
        .handler(move |_, _, _| {
            hits_in.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();
    bot.registry().add_command("ping", Arc::new(ping)).unwrap();
    let dispatcher = Dispatcher::new(Arc::clone(&bot));

    dispatcher.dispatch(Event::message("brassbot ping"));
    bot.apply_session(Session {
        identity: Identity::new("U42", "tin"),
        ..MemoryTransport::default().session().clone()
    });
    dispatcher.dispatch(Event::message("brassbot ping"));
    dispatcher.dispatch(Event::message("tin ping"));

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn priority_order_and_ties() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let commands = [("a", 5), ("b", -5), ("c", 0), ("d", 5)]
        .into_iter()
        .map(|(name, priority)| {
            let hits = Arc::clone(&hits);
            Arc::new(
                Command::builder(name)
                    .priority(priority)
                    .occlusion(Occlusion::Passive)
                    .handler(move |_, _, _| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
        })
        .collect();
    bot.registry().register("m", commands).unwrap();

    assert_eq!(names(&bot), ["a", "d", "c", "b"]);
    let report = Dispatcher::new(Arc::clone(&bot)).dispatch(Event::message("x"));
    assert_eq!(report.fired, ["a", "d", "c", "b"]);
}

#[test]
fn wildcard_field_filter() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let ack = Command::builder("ack")
        .untyped()
        .has_field("reply_to")
        .occlusion(Occlusion::Passive)
        .handler({
            let hits = Arc::clone(&hits);
            move |_, _, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    bot.registry().add_command("ack", Arc::new(ack)).unwrap();
    let dispatcher = Dispatcher::new(bot);

    dispatcher.dispatch(Event::untyped().with("reply_to", 1));
    dispatcher.dispatch(Event::untyped().with("reply_to", "abc"));
    dispatcher.dispatch(Event::untyped().with("ok", true));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn lifecycle_limits() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let once_hits = Arc::new(AtomicUsize::new(0));
    let stale_hits = Arc::new(AtomicUsize::new(0));

    let once = Command::builder("once")
        .activations(1)
        .occlusion(Occlusion::Passive)
        .handler({
            let hits = Arc::clone(&once_hits);
            move |_, _, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    let stale = Command::builder("stale")
        .deadline(Instant::now() - Duration::from_millis(1))
        .occlusion(Occlusion::Passive)
        .handler({
            let hits = Arc::clone(&stale_hits);
            move |_, _, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    bot.registry()
        .register("m", vec![Arc::new(once), Arc::new(stale)])
        .unwrap();

    let dispatcher = Dispatcher::new(Arc::clone(&bot));
    dispatcher.dispatch(Event::message("first"));
    dispatcher.dispatch(Event::message("second"));

    assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    assert_eq!(stale_hits.load(Ordering::SeqCst), 0);
    assert!(bot.registry().all_commands().is_empty());
}

struct Flaky {
    broken: Arc<AtomicBool>,
}

impl ModuleProvider for Flaky {
    fn id(&self) -> &str {
        "flaky"
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("handler raised during load");
        }
        let hits = Arc::new(AtomicUsize::new(0));
        Ok(vec![
            counter_command("a", Occlusion::Passive, &hits),
            counter_command("b", Occlusion::Passive, &hits),
        ])
    }
}

#[test]
fn failed_reload_rolls_back() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let broken = Arc::new(AtomicBool::new(false));
    bot.install_module(Arc::new(Flaky {
        broken: Arc::clone(&broken),
    }));
    assert!(bot.load_modules().is_empty());
    let before = bot.registry().all_commands();

    broken.store(true, Ordering::SeqCst);
    let err = assert_err!(bot.reload_module("flaky"));
    assert!(matches!(err, ModuleLoadError::Provider { .. }));

    let after = bot.registry().all_commands();
    assert_eq!(names(&bot), ["a", "b"]);
    assert!(before.iter().zip(after.iter()).all(|(x, y)| Arc::ptr_eq(x, y)));
}

#[test]
fn unload_reload_round_trip_preserves_order() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let hits = Arc::new(AtomicUsize::new(0));
    bot.registry()
        .register(
            "first",
            vec![Arc::new(counter_command("x", Occlusion::Passive, &hits))],
        )
        .unwrap();
    bot.registry()
        .register(
            "second",
            vec![
                Arc::new(counter_command("y", Occlusion::Passive, &hits)),
                Arc::new(counter_command("z", Occlusion::Passive, &hits)),
            ],
        )
        .unwrap();
    bot.registry()
        .register(
            "third",
            vec![Arc::new(counter_command("w", Occlusion::Passive, &hits))],
        )
        .unwrap();
    let before = names(&bot);

    let set = bot.registry().unload("first");
    assert_eq!(names(&bot), ["y", "z", "w"]);
    bot.registry().reload("first", set).unwrap();
    assert_eq!(names(&bot), before);
}

#[test]
fn normalization_is_idempotent() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let mut once = Event::message("look <http://example.com>")
        .with("channel", "D1")
        .with("user", "U2");
    normalize(bot.directory(), &mut once);
    let mut twice = once.clone();
    normalize(bot.directory(), &mut twice);

    assert_eq!(once, twice);
    assert_eq!(once.get_str("channel_name"), Some("@alice"));
    assert_eq!(once.get_str("user_name"), Some("bob"));
    assert_eq!(once.text(), Some("look http://example.com"));
}

#[test]
fn handler_can_register_follow_up_command() {
    let (bot, transport) = test_bot(MemoryTransport::default());
    let ask = Command::builder("ask")
        .rule("$@bot ask")
        .occlusion(Occlusion::Exclusive)
        .handler(|ctx, _, _| {
            ctx.reply("really?")?;
            let answer = Command::builder("answer")
                .rule("$yes")
                .priority(10)
                .activations(1)
                .ttl(Duration::from_secs(60))
                .occlusion(Occlusion::Exclusive)
                .handler(|ctx, _, _| {
                    ctx.reply("ok then")?;
                    Ok(())
                })
                .build()?;
            ctx.register_command("questions", answer)?;
            Ok(())
        })
        .build()
        .unwrap();
    bot.registry().add_command("questions", Arc::new(ask)).unwrap();

    let dispatcher = Dispatcher::new(Arc::clone(&bot));
    dispatcher.dispatch(Event::message("@brassbot ask").with("channel", "C1"));
    dispatcher.dispatch(Event::message("yup").with("channel", "C1"));
    dispatcher.dispatch(Event::message("yup").with("channel", "C1"));

    assert_eq!(transport.sent_texts(), ["really?", "ok then"]);
    assert_eq!(names(&bot), ["ask"]);
}

#[tokio::test]
async fn transport_events_flow_through_run_loop() {
    let (bot, transport) = test_bot(MemoryTransport::default());
    let echo = Command::builder("echo")
        .rule("$@bot echo (.+)")
        .occlusion(Occlusion::Exclusive)
        .handler(|ctx, _, caps| {
            ctx.reply(caps.get(0).unwrap_or_default())?;
            Ok(())
        })
        .build()
        .unwrap();
    bot.registry().add_command("echo", Arc::new(echo)).unwrap();

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bot)));
    transport.on_receive(dispatcher.sink());
    let handle = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.run().await }
    });

    assert!(transport.inject(Event::message("<@U42> echo ping").with("channel", "C1")));

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    bot.tasks().shutdown().await;
    handle.await.unwrap();
    assert_eq!(transport.sent_texts(), ["ping"]);
}

#[tokio::test]
async fn connect_failure_is_reported() {
    let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::refusing());
    let bot = Bot::builder(transport).build();
    let err = assert_err!(bot.connect().await);
    assert!(err.to_string().contains("invalid_auth"));
}

#[tokio::test]
async fn run_loop_survives_panicking_handler() {
    let (bot, transport) = test_bot(MemoryTransport::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let explode = Command::builder("explode")
        .rule("$@bot explode")
        .priority(5)
        .occlusion(Occlusion::Exclusive)
        .handler(|_, _, _| panic!("handler bug"))
        .build()
        .unwrap();
    bot.registry().add_command("explode", Arc::new(explode)).unwrap();
    bot.registry()
        .add_command("count", Arc::new(counter_command("count", Occlusion::Passive, &hits)))
        .unwrap();

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bot)));
    transport.on_receive(dispatcher.sink());
    let handle = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.run().await }
    });

    assert!(transport.inject(Event::message("<@U42> explode").with("channel", "C1")));
    assert!(transport.inject(Event::message("anything else").with("channel", "C1")));

    tokio::time::timeout(Duration::from_secs(5), async {
        while hits.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    bot.tasks().shutdown().await;
    assert!(handle.await.is_ok());
    assert_eq!(names(&bot), ["explode", "count"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn threaded_handler_runs_after_dispatch_returns() {
    let (bot, _transport) = test_bot(MemoryTransport::default());
    let release = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let slow = Command::builder("slow")
        .occlusion(Occlusion::Exclusive)
        .threaded(true)
        .handler({
            let release = Arc::clone(&release);
            let finished = Arc::clone(&finished);
            move |_, _, _| {
                while !release.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(2));
                }
                finished.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    bot.registry().add_command("slow", Arc::new(slow)).unwrap();

    let report = Dispatcher::new(Arc::clone(&bot)).dispatch(Event::message("go"));
    assert_eq!(report.fired, ["slow"]);
    assert!(report.handled);
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(bot.tasks().len(), 1);

    release.store(true, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(5), bot.tasks().shutdown())
        .await
        .unwrap();
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn placeholder_rule_matches_identity_given_at_build() {
    let transport = Arc::new(MemoryTransport::default());
    let bot = Bot::builder(Arc::clone(&transport) as Arc<dyn Transport>)
        .identity(Identity::new("U42", "brassbot"))
        .build();
    let hits = Arc::new(AtomicUsize::new(0));
    let ping = Command::builder("ping")
        .rule("$@bot ping")
        .occlusion(Occlusion::Exclusive)
        .handler({
            let hits = Arc::clone(&hits);
            move |_, _, _| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    bot.registry().add_command("ping", Arc::new(ping)).unwrap();
    let dispatcher = Dispatcher::new(Arc::clone(&bot));

    assert!(dispatcher.dispatch(Event::message("@ ping")).fired.is_empty());
    assert_eq!(dispatcher.dispatch(Event::message("<@U42> ping")).fired, ["ping"]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
