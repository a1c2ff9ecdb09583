use ngx_data::{
    bus::handler,
    config::{MarketSimConfig, NewsSimConfig},
    market::{MarketEvent, MarketEventKind, MarketSimulator},
    news::{NewsEventKind, NewsSimulator, Priority},
};
use ngx_terminal::{
    AlertCondition, MarketView, NewsView, OrderRequest, TradingConfig, TradingDesk, WATCHLIST_SIZE,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_test::assert_ok;

#[tokio::test(start_paused = true)]
async fn views_follow_shared_simulators() {
    let market = MarketSimulator::new(MarketSimConfig::default().with_seed(11));
    let news = NewsSimulator::new(NewsSimConfig::default().with_seed(12));

    let mut market_view = assert_ok!(MarketView::mount(market.clone()));
    let mut news_view = assert_ok!(NewsView::mount(news.clone()));
    let mut desk = assert_ok!(TradingDesk::mount(market.clone(), TradingConfig::default()));

    assert_ok!(desk.place_order(OrderRequest::buy("ZENITH", 100.0)));
    tokio::time::sleep(Duration::from_millis(6_100)).await;

    // Snapshots at 2s, 4s & 6s keep the view in lockstep with the simulator
    let watchlist = market_view.watchlist();
    assert_eq!(watchlist.len(), WATCHLIST_SIZE);
    assert_eq!(watchlist.iter().collect::<HashSet<_>>().len(), WATCHLIST_SIZE);
    assert_eq!(watchlist, market.watchlist());
    assert_eq!(market_view.watchlist_quotes().len(), WATCHLIST_SIZE);

    let zenith = desk.position("ZENITH").unwrap();
    assert_eq!(zenith.current_price, market.stock_data("ZENITH").unwrap().price);

    assert_eq!(news_view.news().len(), 1);
    assert_eq!(news_view.alerts().len(), 1);

    desk.unmount();
    news_view.unmount();
    market_view.unmount();

    assert!(!market.is_connected());
    assert!(!news.is_running());
    assert_eq!(market.bus().handler_count(MarketEventKind::PriceUpdate), 0);
    assert_eq!(news.bus().handler_count(NewsEventKind::News), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_market_events_until_reconnect() {
    let market = MarketSimulator::new(MarketSimConfig::default().with_seed(13));
    let events = Arc::new(AtomicUsize::new(0));

    for kind in [MarketEventKind::PriceUpdate, MarketEventKind::MarketData] {
        let events = Arc::clone(&events);
        market.subscribe(
            kind,
            handler(move |_: &MarketEvent| {
                events.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    let mut view = assert_ok!(MarketView::mount(market.clone()));
    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert!(events.load(Ordering::SeqCst) > 0);

    view.unmount();
    let seen = events.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(events.load(Ordering::SeqCst), seen);

    let _view = assert_ok!(MarketView::mount(market.clone()));
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(events.load(Ordering::SeqCst) > seen);
}

#[tokio::test(start_paused = true)]
async fn movers_and_price_alerts_reach_news_view() {
    let market = MarketSimulator::new(
        MarketSimConfig::default()
            .with_seed(14)
            .with_volatility(0.2)
            .with_snapshot_interval(Duration::from_secs(3)),
    );
    let news = NewsSimulator::new(NewsSimConfig::default().with_seed(15));

    let movers = news.clone();
    market.subscribe(
        MarketEventKind::MarketData,
        handler(move |event: &MarketEvent| {
            if let MarketEvent::MarketData { quotes, .. } = event {
                movers.scan_movers(quotes, 3.0);
            }
            Ok(())
        }),
    );

    let market_view = assert_ok!(MarketView::mount(market.clone()));
    let news_view = assert_ok!(NewsView::mount(news.clone()));
    let armed = news_view
        .add_alert("MTNN", AlertCondition::Above, 1.0, None)
        .unwrap();

    // Price tick at 2s, snapshot at 3s
    tokio::time::sleep(Duration::from_millis(3_100)).await;

    // A 20% volatility tick across the whole catalog moves many quotes past 3%
    let alerts = news_view.alerts();
    assert!(alerts
        .iter()
        .any(|alert| alert.title.starts_with("Price Alert") && alert.priority == Priority::High));

    let fired = news_view.check_price_alerts(&market_view.quotes());
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, armed.id);
    assert_eq!(news_view.banner().map(|alert| alert.id), Some(armed.id));
    assert!(news_view.dismiss(armed.id));
    assert!(news_view.price_alerts().is_empty());
}
