//! Client mirrors converging on server state.
//!
//! Clients receive and acknowledge frames at different rates. Whatever the
//! server last heard from a client, the frame it builds must bring that
//! client's mirror exactly to the server state of the current turn.

use super::track;
use crate::{
    ClientMirror, DetailLevel, ObjectId, ObjectPath, SyncFrame, Turn, WorldObject, Zone,
};

/// One scripted turn of game logic touching attributes, children, nested
/// children and events.
fn play_turn(zone: &mut Zone, root: &ObjectPath, turn: u64) {
    zone.update(root, |player| {
        player.put("hp", 100 - turn as i64);
        player.add_event("tick", turn.to_string());
        match turn % 5 {
            0 => {
                player.remove("title");
            }
            2 => player.put("title", format!("veteran {turn}")),
            _ => {}
        }
        if turn % 7 == 0 {
            player.add_slot(format!("pocket {turn}")).unwrap();
        }

        let mut bag = player.slot_mut("bag").unwrap();
        if turn % 3 == 0 {
            let mut item = WorldObject::new();
            item.put("n", turn as i64);
            item.add_slot("inlay").unwrap();
            bag.add(item);
        }
        if turn % 4 == 0 {
            if let Some(oldest) = bag.first_mut().and_then(|item| item.id()) {
                bag.remove(oldest);
            }
        }
        if let Some(item) = bag.first_mut() {
            item.put("polish", turn as i64);
            if turn % 5 == 3 && !item.has_slot("engraving") {
                item.add_slot("engraving").unwrap();
            }
            if turn % 2 == 0 {
                let mut gem = WorldObject::new();
                gem.put("cut", "round");
                item.slot_mut("inlay").unwrap().add(gem);
            }
        }
    })
    .unwrap();
}

struct Client {
    mirror: ClientMirror,
    acked: Option<Turn>,
    receives: fn(u64) -> bool,
    acknowledges: fn(u64) -> bool,
}

impl Client {
    fn new(receives: fn(u64) -> bool, acknowledges: fn(u64) -> bool) -> Self {
        Self {
            mirror: ClientMirror::new(),
            acked: None,
            receives,
            acknowledges,
        }
    }
}

/// Frame choice of the server for a client that last acknowledged `acked`.
fn frame_for(zone: &Zone, id: &ObjectId, acked: Option<Turn>) -> SyncFrame {
    let Some(acked) = acked else {
        return zone.perception(id, DetailLevel::Full).unwrap();
    };
    match zone.perception_since(id, acked) {
        Ok(frame) => frame,
        Err(e) if e.requires_full_resync() => zone.perception(id, DetailLevel::Full).unwrap(),
        Err(e) => panic!("unexpected perception error: {e}"),
    }
}

fn new_player() -> WorldObject {
    let mut player = WorldObject::new();
    player.put("hp", 100);
    player.add_slot("bag").unwrap();
    player
}

#[test]
fn mirrors_converge_under_lost_acknowledgements() {
    let mut zone = Zone::new("test");
    let id = track(&mut zone, new_player());
    let root = ObjectPath::root(id.clone());

    let mut clients = vec![
        Client::new(|_| true, |_| true),
        Client::new(|turn| turn % 2 == 0, |_| true),
        Client::new(|_| true, |turn| turn % 3 == 0),
        Client::new(|turn| turn % 4 != 1, |turn| turn % 2 == 1),
    ];

    for turn in 0..=16u64 {
        if turn > 0 {
            play_turn(&mut zone, &root, turn);
        }

        for client in &mut clients {
            if turn > 0 && !(client.receives)(turn) {
                continue;
            }
            let frame = frame_for(&zone, &id, client.acked);
            client.mirror.apply(&frame).unwrap();

            let server = zone.get(&id).unwrap();
            let mirrored = client.mirror.state().unwrap();
            assert_eq!(mirrored, server, "mirror diverged at turn {turn}");
            assert_eq!(mirrored.events(), server.events());

            if turn == 0 || (client.acknowledges)(turn) {
                client.acked = client.mirror.acknowledged();
            }
        }

        zone.next_turn();
    }
}

#[test]
fn window_delta_applies_to_every_state_inside_it() {
    let mut zone = Zone::new("test");
    let id = track(&mut zone, new_player());
    let root = ObjectPath::root(id.clone());

    let mut behind = ClientMirror::new();
    let mut current = ClientMirror::new();
    for turn in 0..=5u64 {
        if turn > 0 {
            play_turn(&mut zone, &root, turn);
        }
        if turn == 4 {
            behind.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();
        }
        if turn == 5 {
            current.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();
        }
        zone.next_turn();
    }

    // turn 6 and 7 happen, nothing is read in between
    play_turn(&mut zone, &root, 6);
    let for_current = zone.perception_since(&id, Turn(5)).unwrap();
    current.apply(&for_current).unwrap();
    zone.next_turn();
    play_turn(&mut zone, &root, 7);

    let window = zone.perception(&id, DetailLevel::Delta).unwrap();
    assert!(matches!(window, SyncFrame::Delta { since: Some(Turn(5)), .. }));

    // `behind` is older than the window and must be refused
    assert!(behind.apply(&window).is_err());
    behind.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();

    current.apply(&window).unwrap();
    assert_eq!(current.state(), zone.get(&id));
    assert_eq!(behind.state(), zone.get(&id));
}

#[test]
fn slots_added_after_registration_reach_the_mirror() {
    let mut zone = Zone::new("test");
    let id = track(&mut zone, new_player());
    let root = ObjectPath::root(id.clone());

    let mut mirror = ClientMirror::new();
    mirror.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();
    zone.next_turn();

    let item_id = zone
        .update(&root, |player| player.slot_mut("bag").unwrap().add(WorldObject::new()))
        .unwrap();
    mirror.apply(&zone.perception_since(&id, Turn(0)).unwrap()).unwrap();
    zone.next_turn();

    zone.update(&root, |player| {
        player.add_slot("belt").unwrap();
        player.child_mut(item_id).unwrap().add_slot("inlay").unwrap();
    })
    .unwrap();
    mirror.apply(&zone.perception_since(&id, Turn(1)).unwrap()).unwrap();

    let mirrored = mirror.state().unwrap();
    assert_eq!(Some(mirrored), zone.get(&id));
    assert!(mirrored.slot("belt").unwrap().is_empty());
    assert!(mirrored.child(item_id).unwrap().has_slot("inlay"));
}

#[test]
fn caught_up_client_keeps_its_events() {
    let mut zone = Zone::new("test");
    let id = track(&mut zone, new_player());
    zone.next_turn();
    zone.update(&ObjectPath::root(id.clone()), |player| player.add_event("chat", "hello"))
        .unwrap();

    let mut mirror = ClientMirror::new();
    mirror.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();

    let again = zone.perception_since(&id, Turn(1)).unwrap();
    assert!(again.is_empty_delta());
    mirror.apply(&again).unwrap();

    assert_eq!(mirror.state().unwrap().events(), zone.get(&id).unwrap().events());
    assert_eq!(mirror.state().unwrap().events().len(), 1);
}

#[test]
fn deleted_root_clears_mirror() {
    let mut zone = Zone::new("test");
    let id = track(&mut zone, new_player());
    let mut mirror = ClientMirror::new();
    mirror.apply(&zone.perception(&id, DetailLevel::Full).unwrap()).unwrap();
    zone.next_turn();

    zone.remove(&id).unwrap();
    mirror.apply(&zone.perception_since(&id, Turn(0)).unwrap()).unwrap();

    assert!(mirror.state().is_none());
    assert_eq!(mirror.acknowledged(), Some(Turn(1)));
}
