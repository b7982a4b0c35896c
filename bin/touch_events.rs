//! Duplex touch-event exchange between two threads.
//!
//! A client thread serializes touch events field-by-field into egress
//! slots; a server thread decodes them in place, tallies them by kind,
//! and acknowledges each event's identifier on the reverse direction.
//! Both sides poll with adaptive backoff; the channel itself never
//! blocks.

use std::thread;

use crossbeam_utils::Backoff;
use ringxchg::{Channel, ChannelError, Message, MessageError, Region};

const SLOT_SIZE: usize = 64;
const NR_SLOTS: usize = 64;
const NR_EVENTS: u64 = 250_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    TouchDown,
    TouchDrag,
    TouchUp,
}

impl EventKind {
    fn code(self) -> u16 {
        match self {
            Self::TouchDown => 0,
            Self::TouchDrag => 1,
            Self::TouchUp => 2,
        }
    }

    fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::TouchDown,
            1 => Self::TouchDrag,
            2 => Self::TouchUp,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::TouchDown => "touch_down",
            Self::TouchDrag => "touch_drag",
            Self::TouchUp => "touch_up",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TouchEvent {
    kind: EventKind,
    identifier: u64,
    position_x: i32,
    position_y: i32,
    direction: f32,
    velocity: f32,
    force: f32,
}

fn serialize_event(event: &TouchEvent, message: &mut Message<'_>) -> Result<(), MessageError> {
    message.write_u16(event.kind.code())?;
    message.write_u64(event.identifier)?;
    message.write_i32(event.position_x)?;
    message.write_i32(event.position_y)?;
    message.write_f32(event.direction)?;
    message.write_f32(event.velocity)?;
    message.write_f32(event.force)?;
    Ok(())
}

fn deserialize_event(message: &mut Message<'_>) -> Result<TouchEvent, MessageError> {
    let kind = EventKind::from_code(message.read_u16()?).ok_or(MessageError::InvalidType)?;
    Ok(TouchEvent {
        kind,
        identifier: message.read_u64()?,
        position_x: message.read_i32()?,
        position_y: message.read_i32()?,
        direction: message.read_f32()?,
        velocity: message.read_f32()?,
        force: message.read_f32()?,
    })
}

fn prepare_blocking<'buf>(channel: &mut Channel<'buf>) -> Message<'buf> {
    let backoff = Backoff::new();
    loop {
        match channel.prepare() {
            Ok(message) => return message,
            Err(ChannelError::Full) => backoff.snooze(),
            Err(err) => panic!("prepare: {err}"),
        }
    }
}

fn receive_blocking<'buf>(channel: &mut Channel<'buf>) -> Message<'buf> {
    let backoff = Backoff::new();
    loop {
        match channel.receive() {
            Ok(message) => return message,
            Err(ChannelError::Empty) => backoff.snooze(),
            Err(err) => panic!("receive: {err}"),
        }
    }
}

fn client_main(mut channel: Channel<'_>) {
    let kinds = [EventKind::TouchDown, EventKind::TouchDrag, EventKind::TouchUp];
    let mut acked = 0u64;

    for i in 0..NR_EVENTS {
        let event = TouchEvent {
            kind: kinds[(i % 3) as usize],
            identifier: i,
            position_x: 1270 + (i % 17) as i32,
            position_y: 664 - (i % 11) as i32,
            direction: 204.7,
            velocity: 0.2741058,
            force: 1.0,
        };

        let mut message = prepare_blocking(&mut channel);
        serialize_event(&event, &mut message).expect("event fits in one slot");
        channel.send(&message).expect("prepared message sends");

        // Drain acknowledgements opportunistically to keep the reverse
        // ring from filling.
        while let Ok(mut ack) = channel.receive() {
            let _ = ack.read_u64().expect("ack carries an identifier");
            channel.release(&ack).expect("received message releases");
            acked += 1;
        }
    }

    while acked < NR_EVENTS {
        let mut ack = receive_blocking(&mut channel);
        let _ = ack.read_u64().expect("ack carries an identifier");
        channel.release(&ack).expect("received message releases");
        acked += 1;
    }
    println!("client: {acked} events acknowledged");
}

fn server_main(mut channel: Channel<'_>) {
    let mut counts = [0u64; 3];

    for _ in 0..NR_EVENTS {
        let mut message = receive_blocking(&mut channel);
        let event = deserialize_event(&mut message).expect("client sends valid events");
        channel.release(&message).expect("received message releases");

        counts[(event.kind.code()) as usize] += 1;

        let mut ack = prepare_blocking(&mut channel);
        ack.write_u64(event.identifier).expect("ack fits in one slot");
        channel.send(&ack).expect("prepared message sends");
    }

    for kind in [EventKind::TouchDown, EventKind::TouchDrag, EventKind::TouchUp] {
        println!(
            "server: {} x{}",
            kind.name(),
            counts[kind.code() as usize]
        );
    }
}

fn main() {
    let ring_a = Region::for_slots(SLOT_SIZE, NR_SLOTS);
    let ring_b = Region::for_slots(SLOT_SIZE, NR_SLOTS);

    thread::scope(|scope| {
        scope.spawn(|| {
            let channel =
                Channel::new(SLOT_SIZE, Some(&ring_a), Some(&ring_b)).expect("client channel");
            client_main(channel);
        });
        scope.spawn(|| {
            let channel =
                Channel::new(SLOT_SIZE, Some(&ring_b), Some(&ring_a)).expect("server channel");
            server_main(channel);
        });
    });

    println!("exchanged {NR_EVENTS} events over {NR_SLOTS} slots of {SLOT_SIZE} bytes");
}
