//! # Shell Completion Module
//!
//! Completion scripts for `moodmix`: the plain clap_complete output for every
//! supported shell, plus hand-written bash and fish scripts that also complete
//! genre labels (which contain spaces and mixed case) from the binary itself.
//!
//! ## Usage
//!
//! ```bash
//! moodmix completion zsh > ~/.config/zsh/completions/_moodmix
//! moodmix completion-enhanced bash > ~/.local/share/bash-completion/completions/moodmix
//! ```

use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use moodmix::genre::Genre;
use std::io;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Generate enhanced fish completion script with genre completion
pub fn generate_enhanced_fish_completion() {
    println!(r#"# Enhanced moodmix completion script for Fish shell with genre completion
# Install with: moodmix completion-enhanced fish > ~/.config/fish/completions/moodmix.fish

function __moodmix_complete_genres
    if command -sq moodmix
        moodmix complete-genres 2>/dev/null
    end
end

complete -c moodmix -e

# Global options
complete -c moodmix -s h -l help -d 'Print help information'
complete -c moodmix -s V -l version -d 'Print version information'
complete -c moodmix -l db -r -F -d 'Database file holding catalog and sessions'
complete -c moodmix -l config -r -F -d 'Recommender configuration file (JSON)'
complete -c moodmix -l json -d 'Print results as JSON'

# Main commands
complete -c moodmix -f -n '__fish_use_subcommand' -a 'init-db' -d 'Create the database tables'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'import' -d 'Import pre-analysed songs from JSON'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'add' -d 'Add (or replace) a single song'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'delete' -d 'Remove a song from the catalog'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'list' -d 'List all songs in the catalog'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'search' -d 'Find songs by title or artist'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'playlist' -d 'Build a playlist around a feature query'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'random' -d 'Draw random songs from the catalog'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'recommend' -d 'Recommend the next song for a session'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'session' -d 'Manage listener sessions'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'genres' -d 'List the genre labels accepted by --genre'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'completion' -d 'Generate shell completions'
complete -c moodmix -f -n '__fish_use_subcommand' -a 'completion-enhanced' -d 'Generate enhanced shell completions'

# Genre filters
complete -c moodmix -f -n '__fish_seen_subcommand_from playlist recommend add' -l genre -r -a '(__moodmix_complete_genres)' -d 'Genre label'

# Feature options
for feature in valence arousal authenticity timeliness complexity danceability tonal voice bpm
    complete -c moodmix -f -n '__fish_seen_subcommand_from playlist add' -l $feature -r -d "Feature value"
end
for feature in authenticity timeliness complexity danceability tonal voice bpm
    complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l $feature -r -d "Feature value"
end
complete -c moodmix -f -n '__fish_seen_subcommand_from playlist' -l restore-policy -r -a 'index-order distance-order' -d 'Duplicate restore order'

# recommend
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -s s -l session -r -d 'Session id'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l valence -r -d 'Valence reading'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l arousal -r -d 'Arousal reading'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l unit-range -d 'Readings are in [0, 1]'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l invert-valence -d 'Mirror valence'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l invert-arousal -d 'Mirror arousal'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l weight-valence -r -d 'Valence drift weight'
complete -c moodmix -f -n '__fish_seen_subcommand_from recommend' -l weight-arousal -r -d 'Arousal drift weight'

# session actions
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'start' -d 'Start a session'
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'clear' -d 'Reset a session'
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'end' -d 'Delete a session'
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'played' -d 'Record a played song'
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'show' -d 'Print a session'
complete -c moodmix -f -n '__fish_seen_subcommand_from session' -a 'list' -d 'List sessions'

# import takes files or directories
complete -c moodmix -n '__fish_seen_subcommand_from import' -F

# completion command - complete with shell types
complete -c moodmix -f -n '__fish_seen_subcommand_from completion' -a 'bash zsh fish power-shell elvish'
complete -c moodmix -f -n '__fish_seen_subcommand_from completion-enhanced' -a 'bash fish'
"#);
}

/// Generate enhanced bash completion script with genre completion
pub fn generate_enhanced_bash_completion() {
    println!(r#"#!/bin/bash
# Enhanced moodmix completion script with genre completion
# Install with: moodmix completion-enhanced bash > ~/.local/share/bash-completion/completions/moodmix

_moodmix() {{
    local cur prev words cword
    _init_completion || return

    case "${{prev}}" in
        --genre)
            local IFS=$'\n'
            COMPREPLY=($(compgen -W "$(moodmix complete-genres 2>/dev/null)" -- "${{cur}}"))
            return 0
            ;;
        --restore-policy)
            COMPREPLY=($(compgen -W "index-order distance-order" -- "${{cur}}"))
            return 0
            ;;
        --db|--config|import)
            _filedir
            return 0
            ;;
        completion)
            COMPREPLY=($(compgen -W "bash zsh fish power-shell elvish" -- "${{cur}}"))
            return 0
            ;;
        completion-enhanced)
            COMPREPLY=($(compgen -W "bash fish" -- "${{cur}}"))
            return 0
            ;;
        session)
            COMPREPLY=($(compgen -W "start clear end played show list" -- "${{cur}}"))
            return 0
            ;;
    esac

    local subcommands="init-db import add delete list search playlist random recommend session genres completion completion-enhanced help"
    local features="--valence --arousal --authenticity --timeliness --complexity --danceability --tonal --voice --bpm"

    if [[ $cword -eq 1 ]]; then
        COMPREPLY=($(compgen -W "$subcommands --db --config --json --help --version" -- "${{cur}}"))
    else
        case "${{words[1]}}" in
            playlist)
                COMPREPLY=($(compgen -W "$features --genre --length -n --restore-policy --help" -- "${{cur}}"))
                ;;
            add)
                COMPREPLY=($(compgen -W "$features --id --title --artist --album --duration --genre --help" -- "${{cur}}"))
                ;;
            recommend)
                COMPREPLY=($(compgen -W "$features --session -s --unit-range --invert-valence --invert-arousal --weight-valence --weight-arousal --genre --length -n --help" -- "${{cur}}"))
                ;;
            random)
                COMPREPLY=($(compgen -W "--length -n --help" -- "${{cur}}"))
                ;;
            *)
                COMPREPLY=($(compgen -W "--json --help" -- "${{cur}}"))
                ;;
        esac
    fi
}} &&
complete -F _moodmix moodmix

# ex: filetype=sh
"#);
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Every genre label plus the `none` sentinel, sorted case-insensitively.
pub fn genre_completions() -> Vec<String> {
    let mut labels: Vec<String> = Genre::LABELS
        .iter()
        .chain(std::iter::once(&Genre::None))
        .map(|genre| genre.label().to_string())
        .collect();
    labels.sort_by_key(|label| label.to_lowercase());
    labels
}

/// Print genre labels one per line for the completion scripts
pub fn print_genre_completions() {
    for label in genre_completions() {
        println!("{label}");
    }
}
