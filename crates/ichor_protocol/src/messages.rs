//! The complete message taxonomy.
//!
//! Messages are grouped by subject: session state transfer, player traffic,
//! actor/world events, and voting. The per-kind wire tags live in
//! [`MessageKind`](crate::MessageKind); the structs here are the bodies that
//! follow the tag.

pub mod actor;
pub mod player;
pub mod state;
pub mod vote;

pub use actor::*;
pub use player::*;
pub use state::*;
pub use vote::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_message, MessageFrame};
    use crate::types::{PlayerCommand, PlayerInfo, RecipientKind, TeamColor};
    use crate::{Bounded, Message, MessageKind, MessageSide};

    fn frame_round_trip<M>(msg: M)
    where
        M: Message + crate::Encode + for<'a> crate::Decode<'a> + PartialEq,
    {
        let payload = encode_message(&msg).unwrap();
        let frame = MessageFrame::parse(&payload).unwrap();

        assert_eq!(frame.kind, M::KIND);
        assert_eq!(frame.decode::<M>().unwrap(), msg);
    }

    #[test]
    fn state_messages_round_trip() {
        frame_round_trip(InitialStateS2c {
            world_index: 0,
            player_number: 1,
            map_number: 3,
            rng_seed: 0x1993,
            settings: Default::default(),
        });
        frame_round_trip(GameStateS2c {
            world_index: 10,
            map_number: 3,
            rng_seed: 0x1993,
            snapshot: vec![1, 2, 3, 4],
        });
        frame_round_trip(ClientStatusS2c {
            world_index: 70,
            client_number: 2,
            client_lag: 1,
            server_lag: 2,
            transit_lag: 48,
            packet_loss: 3,
        });
    }

    #[test]
    fn player_messages_round_trip() {
        frame_round_trip(PlayerMessage {
            sender_number: 2,
            recipient_kind: RecipientKind::All,
            recipient_number: 0,
            message: Bounded(String::from("gg")),
        });
        frame_round_trip(PlayerCommandC2s {
            commands: Bounded(vec![PlayerCommand {
                index: 1,
                world_index: 40,
                forward_move: 50,
                ..Default::default()
            }]),
        });
        frame_round_trip(PlayerInfoUpdated {
            world_index: 5,
            player_number: 4,
            info: PlayerInfo::Team(TeamColor::Red),
        });
    }

    #[test]
    fn command_bundle_bound_enforced() {
        let bundle = PlayerCommandC2s {
            commands: Bounded(vec![PlayerCommand::default(); 33]),
        };

        assert!(encode_message(&bundle).is_err());
    }

    #[test]
    fn chat_text_bound_enforced() {
        let msg = PlayerMessage {
            sender_number: 1,
            recipient_kind: RecipientKind::Server,
            recipient_number: 0,
            message: Bounded("x".repeat(256)),
        };

        // 256 content bytes + NUL exceeds the 256-byte bound.
        assert!(encode_message(&msg).is_err());
    }

    #[test]
    fn sides_match_kinds() {
        assert_eq!(TicFinishedS2c::SIDE, MessageSide::Clientbound);
        assert_eq!(PlayerCommandC2s::SIDE, MessageSide::Serverbound);
        assert_eq!(PlayerMessage::SIDE, MessageSide::Both);
        assert_eq!(PlayerMessage::KIND.side(), MessageSide::Both);
        assert_eq!(PlayerCommandC2s::KIND.side(), MessageSide::Serverbound);
    }
}
