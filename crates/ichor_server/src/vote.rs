//! Voting: one proposal at a time, ballots over playermessages, threshold
//! over the eligible (non-spectator, non-AFK) player count.

use std::collections::HashMap;

use ichor_game::TICRATE;

/// Commands players may put to a vote.
const VOTABLE_COMMANDS: [&str; 2] = ["kick", "map"];

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Ballot {
    Yea,
    Nay,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VoteOutcome {
    Passed,
    Failed,
}

/// Why a vote request or ballot was turned away.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VoteRejection {
    VoteAlreadyRunning,
    NotVotable,
    SpectatorsCannotVote,
    AlreadyVoted,
    NoVoteRunning,
}

impl VoteRejection {
    pub const fn message(self) -> &'static str {
        match self {
            Self::VoteAlreadyRunning => "A vote is already in progress.",
            Self::NotVotable => "That command cannot be voted on.",
            Self::SpectatorsCannotVote => "Spectators cannot vote.",
            Self::AlreadyVoted => "You have already voted.",
            Self::NoVoteRunning => "No vote is in progress.",
        }
    }
}

/// The active vote.
#[derive(Clone, Debug)]
pub struct ActiveVote {
    command: String,
    started_tic: u32,
    /// Seconds the vote stays open.
    duration: u32,
    /// Fraction of eligible players required.
    threshold: f64,
    max_votes: u32,
    ballots: HashMap<usize, Ballot>,
}

impl ActiveVote {
    /// Starts a vote if `command` is votable.
    pub fn new(
        command: &str,
        started_tic: u32,
        duration: u32,
        threshold: f64,
        max_votes: u32,
    ) -> Result<Self, VoteRejection> {
        let verb = command.split_whitespace().next().unwrap_or("");

        if !VOTABLE_COMMANDS.contains(&verb) {
            return Err(VoteRejection::NotVotable);
        }

        Ok(Self {
            command: command.to_owned(),
            started_tic,
            duration,
            threshold,
            max_votes,
            ballots: HashMap::new(),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_votes(&self) -> u32 {
        self.max_votes
    }

    /// Records one ballot per client.
    pub fn cast(&mut self, client: usize, ballot: Ballot) -> Result<(), VoteRejection> {
        if self.ballots.contains_key(&client) {
            return Err(VoteRejection::AlreadyVoted);
        }

        self.ballots.insert(client, ballot);
        Ok(())
    }

    pub fn yeas(&self) -> u32 {
        self.ballots.values().filter(|&&b| b == Ballot::Yea).count() as u32
    }

    pub fn nays(&self) -> u32 {
        self.ballots.values().filter(|&&b| b == Ballot::Nay).count() as u32
    }

    fn votes_needed(&self, eligible: u32) -> u32 {
        ((f64::from(eligible) * self.threshold).ceil() as u32).max(1)
    }

    /// The decided outcome, if any: passes the moment the yeas reach the
    /// threshold, fails when the nays make passing impossible, when every
    /// ballot is in, or on expiry.
    pub fn outcome(&self, game_tic: u32, eligible: u32) -> Option<VoteOutcome> {
        let needed = self.votes_needed(eligible);
        let cap = if self.max_votes > 0 {
            eligible.min(self.max_votes)
        } else {
            eligible
        };

        if self.yeas() >= needed {
            return Some(VoteOutcome::Passed);
        }

        let remaining = cap.saturating_sub(self.yeas() + self.nays());
        if self.yeas() + remaining < needed {
            return Some(VoteOutcome::Failed);
        }

        let expiry = self.started_tic + self.duration * TICRATE;
        if game_tic >= expiry {
            return Some(VoteOutcome::Failed);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_votable_commands_accepted() {
        assert!(ActiveVote::new("kick 3 spamming", 0, 30, 0.51, 0).is_ok());
        assert!(ActiveVote::new("map 2", 0, 30, 0.51, 0).is_ok());
        assert!(matches!(
            ActiveVote::new("rcon_password hunter2", 0, 30, 0.51, 0),
            Err(VoteRejection::NotVotable)
        ));
    }

    #[test]
    fn one_ballot_per_client() {
        let mut vote = ActiveVote::new("map 2", 0, 30, 0.5, 0).unwrap();

        vote.cast(1, Ballot::Yea).unwrap();
        assert_eq!(vote.cast(1, Ballot::Nay), Err(VoteRejection::AlreadyVoted));
        assert_eq!(vote.yeas(), 1);
        assert_eq!(vote.nays(), 0);
    }

    #[test]
    fn passes_at_threshold() {
        let mut vote = ActiveVote::new("map 2", 0, 30, 0.5, 0).unwrap();

        // 4 eligible, threshold 0.5: needs 2 yeas.
        vote.cast(1, Ballot::Yea).unwrap();
        assert_eq!(vote.outcome(1, 4), None);

        vote.cast(2, Ballot::Yea).unwrap();
        assert_eq!(vote.outcome(1, 4), Some(VoteOutcome::Passed));
    }

    #[test]
    fn fails_when_passing_is_impossible() {
        let mut vote = ActiveVote::new("kick 3", 0, 30, 0.75, 0).unwrap();

        // 4 eligible, needs 3 yeas; 2 nays leave at most 2 yeas.
        vote.cast(1, Ballot::Nay).unwrap();
        assert_eq!(vote.outcome(1, 4), None);

        vote.cast(2, Ballot::Nay).unwrap();
        assert_eq!(vote.outcome(1, 4), Some(VoteOutcome::Failed));
    }

    #[test]
    fn expires_into_failure() {
        let vote = ActiveVote::new("map 2", 100, 30, 0.5, 0).unwrap();

        assert_eq!(vote.outcome(100, 4), None);
        assert_eq!(
            vote.outcome(100 + 30 * TICRATE, 4),
            Some(VoteOutcome::Failed)
        );
    }
}
